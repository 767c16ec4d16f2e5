mod cli;

use std::process::ExitCode;

use clap::Parser;
use flat_fs::{FlatFs, Geometry};
use typed_bytesize::ByteSizeIec;

use self::cli::{Cli, Command};

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("{e:?}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> flat_fs::Result<()> {
    let geometry = match cli.command {
        Command::Format {
            block_size,
            inodes,
            data_blocks,
        } => Geometry {
            block_size,
            inode_count: inodes,
            data_blocks,
        },
        // other commands read the geometry from the super block
        _ => Geometry::default(),
    };
    let fs = FlatFs::with_geometry(&cli.image, geometry);

    match cli.command {
        Command::Format { .. } => {
            fs.format()?;
            println!("created {}", cli.image.display());
        }
        Command::Remove => {
            fs.remove()?;
            println!("removed {}", cli.image.display());
        }
        Command::Import { path } => fs.import_path(path)?,
        Command::Export { name, out_dir } => {
            let target = fs.export_to(&name, out_dir)?;
            println!("{}", target.display());
        }
        Command::Delete { name } => fs.delete(&name)?,
        Command::List => {
            for entry in fs.list()? {
                println!("{:>12}  {}", ByteSizeIec(entry.size).to_string(), entry.name);
            }
        }
        Command::Map => {
            for region in fs.map()? {
                println!(
                    "{:#010x}  {:<13} {:>10}  ({} blocks)",
                    region.address,
                    region.kind,
                    ByteSizeIec(region.size).to_string(),
                    region.blocks
                );
            }
        }
        Command::Check => {
            let damage = fs.check()?;
            if damage.is_empty() {
                println!("consistent");
            } else {
                for flag in damage.iter() {
                    println!("damaged: {flag:?}");
                }
                return Err(flat_fs::Error::Inconsistent(damage));
            }
        }
    }

    Ok(())
}
