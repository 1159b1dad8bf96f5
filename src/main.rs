// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Args, Parser, Subcommand};
use keynote::config::Keynote;
use keynote::{app, audio, pitch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A computer-keyboard piano and note-reading trainer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// The path to a keynote config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The audio device to play through. Overrides the config file.
    #[arg(short, long)]
    device: Option<String>,
}

impl RunArgs {
    fn load(&self) -> Result<Keynote, Box<dyn Error>> {
        let mut config = Keynote::load(self.config.as_deref())?;
        if let Some(device) = &self.device {
            config.set_audio(config.audio().with_device(device));
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the instrument and trainer key maps.
    Keys {},
    /// Plays the keyboard instrument.
    Play(RunArgs),
    /// Runs the note trainer.
    Train(RunArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Keys {} => {
            println!("Instrument (z/x shift octaves):");
            println!("{}", app::keyboard_layout(0, true));
            println!("\nTrainer:");
            for (key, note) in pitch::trainer_keys() {
                println!("- {} {}", key, note);
            }
        }
        Commands::Play(args) => app::play(&args.load()?).await?,
        Commands::Train(args) => app::train(&args.load()?).await?,
    }

    Ok(())
}
