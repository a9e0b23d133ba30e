use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use log::info;

use hsmc::emit::{self, Lang};
use hsmc::model::Model;
use hsmc::{dot, normalize, validate};

/// Hierarchical state machine compiler.
#[derive(Parser)]
#[command(name = "hsmc", version, disable_version_flag = true)]
struct Cli {
    /// Input model file (YAML statechart)
    file: PathBuf,

    /// Output language; defaults to the model's `language` key
    #[arg(long, value_enum)]
    lang: Option<Lang>,

    /// Output base path, without extension
    #[arg(short, long, default_value = "./statemachine")]
    output: PathBuf,

    /// Print version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let text = fs::read_to_string(&cli.file)
        .with_context(|| format!("cannot read '{}'", cli.file.display()))?;
    let model: Model = serde_yaml::from_str(&text).context("YAML syntax error")?;

    let languages: Vec<Lang> = match cli.lang {
        Some(lang) => vec![lang],
        None => model
            .languages()
            .iter()
            .map(|name| {
                Lang::from_name(name).ok_or_else(|| {
                    anyhow::anyhow!("unsupported language '{name}' (expected c, rust, or python)")
                })
            })
            .collect::<Result<_, _>>()?,
    };

    info!("validating model");
    let chart = normalize::normalize(model)?;
    validate::validate(&chart)?;

    if let Some(dir) = cli.output.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create '{}'", dir.display()))?;
        }
    }
    let basename = cli
        .output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statemachine".to_owned());

    let dot_path = with_ext(&cli.output, ".dot");
    let mut rendered = dot::render(&chart);
    rendered.push('\n');
    fs::write(&dot_path, rendered)
        .with_context(|| format!("cannot write '{}'", dot_path.display()))?;
    info!("wrote {}", dot_path.display());

    for lang in languages {
        info!("generating {} code", lang.name());
        for file in emit::generate(&chart, lang, &basename)? {
            let out_path = with_ext(&cli.output, file.ext);
            fs::write(&out_path, &file.contents)
                .with_context(|| format!("cannot write '{}'", out_path.display()))?;
            info!("wrote {}", out_path.display());
        }
    }
    Ok(())
}

fn with_ext(base: &Path, ext: &str) -> PathBuf {
    let mut os = base.as_os_str().to_owned();
    os.push(ext);
    PathBuf::from(os)
}
