mod app;
mod cli;

use eframe::egui;
use fastblur::logger;

fn main() -> Result<(), eframe::Error> {
    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        std::process::exit(cli::run(args));
    }

    // -- GUI mode --------------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 680.0])
            .with_title("FastBlur"),
        ..Default::default()
    };

    eframe::run_native(
        "FastBlur",
        options,
        Box::new(|cc| Box::new(app::FastBlurApp::new(cc))),
    )
}
