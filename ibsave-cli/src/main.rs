use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ibsave::{PackageInfo, SaveFile, Title};

/// File name the original editor writes decoded documents under.
const JSON_OUTPUT_NAME: &str = "Deserialized Save Data.json";

#[derive(Parser)]
#[command(author, version, about = "Convert Infinity Blade save packages to and from JSON")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum TitleArg {
    Ib1,
    Ib2,
    Ib3,
    Vote,
}

impl From<TitleArg> for Title {
    fn from(value: TitleArg) -> Title {
        match value {
            TitleArg::Ib1 => Title::Ib1,
            TitleArg::Ib2 => Title::Ib2,
            TitleArg::Ib3 => Title::Ib3,
            TitleArg::Vote => Title::Vote,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Decode a save package into an editable JSON document
    Decode {
        /// Path to the save package
        input: PathBuf,
        /// Directory the JSON document is written into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Skip automatic classification and decode as this title
        #[arg(long, value_enum)]
        title: Option<TitleArg>,
    },
    /// Rebuild a save package from an edited JSON document
    Encode {
        /// Path to the edited JSON document
        input: PathBuf,
        /// The package the document was decoded from, consulted for its
        /// header and title
        #[arg(long)]
        original: PathBuf,
        /// Directory the rebuilt package is written into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Skip automatic classification and encode as this title
        #[arg(long, value_enum)]
        title: Option<TitleArg>,
    },
}

fn package_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn decode(input: &Path, out_dir: &Path, title: Option<TitleArg>) -> anyhow::Result<()> {
    let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let name = package_name(input);
    let save = match title {
        Some(title) => SaveFile::read_as(&data, &name, title.into())?,
        None => SaveFile::read(&data, &name)?,
    };
    eprintln!(
        "{}: {:?}{}",
        save.info.package_name,
        save.info.title,
        if save.info.encrypted { ", encrypted" } else { "" },
    );

    let document = save.to_json()?;
    let out = out_dir.join(JSON_OUTPUT_NAME);
    fs::write(&out, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

fn encode(
    input: &Path,
    original: &Path,
    out_dir: &Path,
    title: Option<TitleArg>,
) -> anyhow::Result<()> {
    let original_data =
        fs::read(original).with_context(|| format!("reading {}", original.display()))?;
    let name = package_name(original);
    let info = match title {
        Some(title) => PackageInfo::resolve_as(&original_data, &name, title.into())?,
        None => PackageInfo::resolve(&original_data, &name)?,
    };

    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let document: serde_json::Value = serde_json::from_str(&text)?;
    let save = SaveFile::from_json(info, &document)?;

    let out = out_dir.join(format!("{name}.bin"));
    fs::write(&out, save.write()?).with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Decode {
            input,
            out_dir,
            title,
        } => decode(&input, &out_dir, title),
        Command::Encode {
            input,
            original,
            out_dir,
            title,
        } => encode(&input, &original, &out_dir, title),
    }
}
