#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]
#![warn(rust_2018_idioms)]

use anyhow::{bail, Context, Result as AResult};
use libcommon::vfs::{HostFileSystem, VirtualFileSystem};
use pico_args::Arguments;
use reelcore::{
    container,
    name,
    runtime::{NullPresenter, Runtime, RuntimeConfig},
};
use std::{env, io::Read, path::PathBuf, process::exit};

enum Command {
    Detect,
    ListChunks,
    PrintConfig,
    PrintCastMembers,
    PrintScore,
    Run(u32),
}

fn exit_usage() -> ! {
    eprintln!(
        "usage: {} <detect|list-chunks|print-config|print-cast-members|print-score|run> [--ticks N] <file>",
        env::args().next().unwrap_or_else(|| "reel-cli".to_string())
    );
    exit(1);
}

fn parse_command(args: &mut Arguments) -> AResult<Command> {
    if let Ok(Some(subcommand)) = args.subcommand() {
        Ok(match subcommand.as_ref() {
            "detect" => Command::Detect,
            "list-chunks" => Command::ListChunks,
            "print-config" => Command::PrintConfig,
            "print-cast-members" => Command::PrintCastMembers,
            "print-score" => Command::PrintScore,
            "run" => Command::Run(args.opt_value_from_str("--ticks")?.unwrap_or(10)),
            cmd => bail!("invalid command '{}'", cmd),
        })
    } else {
        bail!("missing command")
    }
}

fn read_bytes(path: &PathBuf) -> AResult<Vec<u8>> {
    let fs = HostFileSystem::new();
    let file = fs.open(path).with_context(|| format!("can't open {}", path.display()))?;
    let mut data = file.data();
    let mut bytes = Vec::new();
    data.read_to_end(&mut bytes).with_context(|| format!("can't read {}", path.display()))?;
    Ok(bytes)
}

fn run_command(command: &Command, path: &PathBuf) -> AResult<()> {
    let bytes = read_bytes(path)?;

    match command {
        Command::Detect => {
            let index = container::load(&bytes)?;
            println!("root kind: {}", index.root_kind);
            println!("director version: {}", index.version.director_version);
        }
        Command::ListChunks => {
            let index = container::load(&bytes)?;
            println!("{} chunk(s)", index.len());
        }
        Command::PrintConfig => {
            let index = container::load(&bytes)?;
            let chunk = index.first_of_kind(reelcore::platform::OsType::new(*b"VWCF")).context("no config chunk")?;
            let config = reelcore::resources::config::decode(&chunk.bytes()?)?;
            println!("stage: {}x{}", config.stage_rect.width(), config.stage_rect.height());
            println!("tempo: {}", config.tempo);
            println!("color depth: {}", config.color_depth);
        }
        Command::PrintCastMembers => {
            let runtime = Runtime::new(RuntimeConfig::new(), Box::new(NullPresenter));
            let movie = runtime.load(&bytes)?;
            for number in 1..=u16::MAX {
                match movie.cast.member(1, number) {
                    Some(member) => println!("{}: {} ({:?})", member.number, member.name, member.kind),
                    None if number > 1 => break,
                    None => {}
                }
            }
        }
        Command::PrintScore => {
            let runtime = Runtime::new(RuntimeConfig::new(), Box::new(NullPresenter));
            let movie = runtime.load(&bytes)?;
            println!("{} frame(s)", movie.frame_count());
        }
        Command::Run(ticks) => {
            let mut runtime = Runtime::new(RuntimeConfig::new(), Box::new(NullPresenter));
            let mut movie = runtime.load(&bytes)?;
            runtime.start(&mut movie);
            for _ in 0..*ticks {
                let snapshot = runtime.tick(&mut movie, 0);
                println!("frame {}: {} active member(s)", snapshot.frame, snapshot.active_members.len());
            }
            runtime.stop(&mut movie);
        }
    }

    Ok(())
}

fn main() -> AResult<()> {
    eprintln!("{} file inspector", name(true));

    let mut args = Arguments::from_env();
    let command = match parse_command(&mut args) {
        Ok(command) => command,
        Err(error) => {
            eprintln!("{}", error);
            exit_usage();
        }
    };

    let files = args.free()?;
    if files.is_empty() {
        eprintln!("no files specified");
        exit_usage();
    }

    for filename in &files {
        let path = PathBuf::from(filename);
        if files.len() > 1 {
            println!("{}:", filename);
        }
        if let Err(error) = run_command(&command, &path) {
            eprintln!("{:?}", error);
            if files.len() == 1 {
                exit(1);
            }
        }
        if files.len() > 1 {
            println!();
        }
    }

    Ok(())
}
