use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;

use clipvec::config::Config;
use clipvec::logging;
use clipvec::{extract, EncodingResult, ExtractOptions, ExtractProgress};

struct CliArgs {
    config_path: Option<PathBuf>,
    model: Option<PathBuf>,
    images: Vec<String>,
    texts: Vec<String>,
    threads: Option<i32>,
    json: bool,
    verbose: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = CliArgs {
        config_path: None,
        model: None,
        images: Vec::new(),
        texts: Vec::new(),
        threads: None,
        json: false,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("clipvec {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--model" | "-m" => {
                if i + 1 < args.len() {
                    parsed.model = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --model requires a path argument");
                    std::process::exit(1);
                }
            }
            "--image" | "-i" => {
                if i + 1 < args.len() {
                    parsed.images.push(args[i + 1].clone());
                    i += 1;
                } else {
                    eprintln!("Error: --image requires a path argument");
                    std::process::exit(1);
                }
            }
            "--text" | "-t" => {
                if i + 1 < args.len() {
                    parsed.texts.push(args[i + 1].clone());
                    i += 1;
                } else {
                    eprintln!("Error: --text requires a string argument");
                    std::process::exit(1);
                }
            }
            "--threads" | "-j" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(n) => parsed.threads = Some(n),
                        Err(_) => {
                            eprintln!("Error: --threads requires an integer argument");
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                } else {
                    eprintln!("Error: --threads requires an integer argument");
                    std::process::exit(1);
                }
            }
            "--json" => {
                parsed.json = true;
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"clipvec - batch CLIP embedding extraction

USAGE:
    clipvec [OPTIONS] --model DIR [--image PATH]... [--text STRING]...

OPTIONS:
    --model, -m DIR     Model directory (vision_model.onnx, text_model.onnx, tokenizer.json)
    --image, -i PATH    Image file or directory to encode (repeatable)
    --text, -t STRING   Text string to encode (repeatable)
    --threads, -j N     Encoder thread count
    --json              Print the full result as JSON
    --verbose, -v       Log each processed item
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    CLIPVEC_LOG         Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/clipvec/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    if args.verbose && std::env::var("CLIPVEC_LOG").is_err() {
        std::env::set_var("CLIPVEC_LOG", "debug");
    }

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    // Load configuration
    let config = match args.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // An absent model directory falls through as an empty path, which the
    // extractor reports as its own fatal error.
    let model_path = args
        .model
        .or_else(|| config.model_dir.clone())
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();

    let options = ExtractOptions {
        n_threads: args.threads.unwrap_or(config.threads),
        verbose: args.verbose,
    };

    // Render progress events on stderr while the batch runs.
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            match event {
                ExtractProgress::Started { total_inputs } => {
                    eprintln!("Processing {} inputs", total_inputs);
                }
                ExtractProgress::Processing { current, total, .. } => {
                    let percent = current as f32 / total.max(1) as f32 * 100.0;
                    eprint!("\rProcessing: {:.2}%", percent);
                    let _ = std::io::stderr().flush();
                }
                ExtractProgress::Completed { .. } => {
                    eprintln!();
                }
            }
        }
    });

    let result = extract(&model_path, &args.images, &args.texts, &options, Some(tx));
    let _ = printer.join();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if !result.success {
        std::process::exit(1);
    }

    Ok(())
}

fn print_summary(result: &EncodingResult) {
    if !result.success {
        eprintln!("Error: {}", result.error_message);
        return;
    }

    println!(
        "Processed {} images and {} texts ({} skipped)",
        result.processed_images,
        result.processed_texts,
        result.skipped.len()
    );
    for item in &result.skipped {
        println!("  skipped {}: {}", item.input, item.reason);
    }

    let t = &result.timing;
    println!();
    println!("--- Timing Statistics ---");
    println!("Folder scanning time: {:.3} seconds", t.folder_scan_secs);
    if result.processed_images > 0 {
        println!(
            "Average image loading time: {:.3} seconds",
            t.image_load_secs / result.processed_images as f64
        );
        println!(
            "Average image encoding time: {:.3} seconds",
            t.image_encode_secs / result.processed_images as f64
        );
    }
    if result.processed_texts > 0 {
        println!(
            "Average text encoding time: {:.3} seconds",
            t.text_encode_secs / result.processed_texts as f64
        );
    }
    println!("Total processing time: {:.3} seconds", t.total_secs);
}
