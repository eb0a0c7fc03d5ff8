mod classifier;
mod cli;
mod config;
mod error;
mod hand;
mod ipc;
mod labels;
mod logging;
mod normalize;
mod processor;
mod smoother;
mod trajectory;
mod voter;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
