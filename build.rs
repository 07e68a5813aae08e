// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value("recipegen.toml")
        .help("Configuration file")
}

fn build_cli() -> Command {
    Command::new("recipegen")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate conda recipes from EUPS manifests")
        .arg(config_arg())
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log debug output"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("generate")
                .about("Generate recipes for a manifest and write the rebuild script")
                .arg(
                    Arg::new("manifest")
                        .required(true)
                        .help("Manifest file, or build:<id> to fetch a published manifest"),
                )
                .arg(
                    Arg::new("products")
                        .num_args(0..)
                        .help("Top-level products (default: everything in the manifest)"),
                )
                .arg(
                    Arg::new("offline")
                        .long("offline")
                        .action(ArgAction::SetTrue)
                        .help("Do not refresh the build index from the channels first"),
                ),
        )
        .subcommand(
            Command::new("reindex").about("Refresh the build index from the configured channels"),
        )
        .subcommand(
            Command::new("uploads").about("List locally built packages that no remote channel has"),
        )
        .subcommand(
            Command::new("hash")
                .about("Print the content hash of a recipe directory")
                .arg(Arg::new("dir").required(true).help("Recipe directory"))
                .arg(
                    Arg::new("files")
                        .long("files")
                        .action(ArgAction::SetTrue)
                        .help("Also print the per-file hashes"),
                ),
        )
        .subcommand(
            Command::new("translate")
                .about("Translate an EUPS version to a conda version")
                .arg(Arg::new("product").required(true).help("EUPS product name"))
                .arg(Arg::new("version").required(true).help("EUPS version string")),
        )
        .subcommand(
            Command::new("next-build")
                .about("Print the next free build number for a conda package version")
                .arg(Arg::new("name").required(true).help("Conda package name"))
                .arg(Arg::new("version").required(true).help("Conda version")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("recipegen.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
