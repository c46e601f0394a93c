mod classify;
mod cli;
mod config;
mod engine;
mod gestures;
mod ipc;
mod landmarks;
mod logging;
mod pointer;
mod replay;
mod smoothing;
mod source;
mod transform;
mod two_hand;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
