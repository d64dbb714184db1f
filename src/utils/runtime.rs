use anyhow::Result;


/// The tracker runs one tick at a time, so the daemon never needs more than one thread.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
