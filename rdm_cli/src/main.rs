use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;
use tokio::sync::oneshot;

use rdm_core::{DownloadEngine, SessionState};

mod progress_view;
use progress_view::TerminalProgressView;

#[derive(Parser)]
#[command(name = "rdm", about = "Rust range-download manager")]
struct Args {
    /// URL to download
    url: String,

    /// Output file path
    #[arg(short, long, default_value = "downloaded_file")]
    output: String,

    /// Session id (distinguishes concurrent downloads sharing an engine)
    #[arg(long, default_value_t = 0)]
    id: u8,

    /// Resume an existing partial file instead of starting over
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Bytes requested per range
    #[arg(long, default_value_t = 1024 * 1024)]
    down_size: u64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let engine = DownloadEngine::new(args.down_size);
    let view = Arc::new(TerminalProgressView::new());

    let (done_tx, done_rx) = oneshot::channel();
    let done_tx = Mutex::new(Some(done_tx));

    let view_progress = view.clone();
    engine.subscribe_progress(Box::new(move |id, downloaded, total| {
        view_progress.on_progress(id, downloaded, total);
    }));

    let view_state = view.clone();
    engine.subscribe_state(Box::new(move |id, state| {
        view_state.on_state(id, state);
        if matches!(
            state,
            SessionState::Complete | SessionState::Canceled | SessionState::Error
        ) {
            if let Some(tx) = done_tx.lock().unwrap().take() {
                let _ = tx.send(state);
            }
        }
    }));

    println!("Starting download: {}", args.url);
    let start = Instant::now();

    if let Err(err) = engine
        .download(args.url.clone(), args.output.clone(), args.resume, args.id)
        .await
    {
        eprintln!("Download failed to start: {err}");
        return;
    }

    match done_rx.await {
        Ok(SessionState::Complete) => {
            println!(
                "Download completed in {:.2}s",
                start.elapsed().as_secs_f64()
            );
        }
        Ok(SessionState::Canceled) => println!("Download canceled"),
        Ok(state) => eprintln!("Download ended in unexpected state {state:?}"),
        Err(_) => eprintln!("Download terminated without a final state"),
    }
}
