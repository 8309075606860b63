//! # inicascade demo application
//!
//! A sample CLI tool that opens a cascaded configuration and exposes it
//! through the `config` subcommands. It exists to try the library by hand.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example inicascade_demo -- show
//! cargo run --example inicascade_demo -- config -g View set Zoom 150
//! cargo run --example inicascade_demo -- config groups
//! ```
//!
//! Put a `demorc` with `[View]\nZoom[$i]=100` into a directory listed in
//! `$XDG_CONFIG_DIRS` to see kiosk locking refuse the `set`.

use clap::{Parser, Subcommand};

use inicascade::{Color, Config, ConfigArgs, WriteFlags};

/// inicascade demo: a sample CLI app over a cascaded INI file.
#[derive(Parser, Debug)]
#[command(name = "inicascade-demo")]
struct Cli {
    /// Also fold and write the shared globals file.
    #[arg(long, global = true)]
    globals: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the typed view settings.
    Show,
    /// Bump the launch counter and save.
    Launch,
    /// Manage the configuration file.
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();
    let mut config = match Config::builder()
        .app_name("demo")
        .include_globals(cli.globals)
        .open()
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Show => {
            let view = config.group("View");
            let zoom: i32 = view.read_entry("Zoom", 100);
            let accent = view.read_entry("Accent", Color::rgb(0x33, 0x66, 0x99));
            let locked = view.is_entry_immutable("Zoom");
            println!("zoom   = {zoom}{}", if locked { " (locked)" } else { "" });
            println!("accent = {accent}");
            println!("data   = {}", view.read_path_entry("DataDir", "$HOME/.local/share/demo"));
        }
        Commands::Launch => {
            let mut stats = config.group("Stats");
            let launches: u32 = stats.read_entry("Launches", 0);
            stats.write_entry("Launches", &(launches + 1), WriteFlags::default());
            let outcome = config.sync();
            println!("launches = {} (saved: {})", launches + 1, !outcome.entries_left);
        }
        Commands::Config(args) => match config.handle(&args.into_action()) {
            Ok(result) => println!("{result}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
    }
}
