//! DisQueue Worker - Entry Point
//!
//! Drains every configured queue from the broker and dispatches jobs to
//! the handlers registered in `lib.rs::build_handlers`.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    disqueue_worker::run().await
}
