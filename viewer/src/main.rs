use lumen::{app, info::Info, ren::Settings};

use std::process::ExitCode;

const SETTINGS_PATH: &str = "lumen.toml";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match Settings::load(SETTINGS_PATH) {
        Ok(settings) => settings,
        Err(error) => {
            log::error!("{SETTINGS_PATH}: {error}");
            return ExitCode::FAILURE;
        }
    };

    let info = Info::new(&settings.title, 1);
    match app::run(info, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("viewer stopped: {error}");
            ExitCode::FAILURE
        }
    }
}
