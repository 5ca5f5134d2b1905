use std::{env, path::PathBuf, process};

use anyhow::{Context, Result};
use quillpost_config::Config;
use quillpost_engine::{codec, Editor, EditorOptions, SimpleDom};

enum OutputFormat {
    Html,
    Text,
}

fn print_usage() {
    eprintln!("Usage: quillpost-cli <document.json> [--text]");
    eprintln!();
    eprintln!("Renders a serialized quillpost document to stdout as HTML");
    eprintln!("(default) or plain text (--text).");
}

fn parse_args() -> Option<(PathBuf, OutputFormat)> {
    let mut path = None;
    let mut format = OutputFormat::Html;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--text" => format = OutputFormat::Text,
            "--html" => format = OutputFormat::Html,
            "-h" | "--help" => return None,
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            other => {
                eprintln!("Unexpected argument: {other}");
                return None;
            }
        }
    }
    path.map(|p| (p, format))
}

fn editor_options() -> EditorOptions {
    match Config::load() {
        Ok(Some(config)) => EditorOptions {
            undo_depth: config.undo_depth,
            undo_grouping_ms: config.undo_grouping_ms,
        },
        Ok(None) => EditorOptions::default(),
        Err(e) => {
            log::warn!("Failed to load config, using defaults: {e}");
            EditorOptions::default()
        }
    }
}

fn render_document(path: &PathBuf, format: OutputFormat) -> Result<String> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = codec::from_json_str(&json)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut editor: Editor<SimpleDom> = Editor::from_document(&value, editor_options())?;
    let mut dom = SimpleDom::new();
    let root = dom.create_root();

    log::debug!(
        "rendering {} sections from {}",
        editor.post().sections().len(),
        path.display()
    );
    editor.render(&mut dom, root);

    Ok(match format {
        OutputFormat::Html => dom.to_html(root),
        OutputFormat::Text => dom.to_text(root),
    })
}

fn main() {
    env_logger::init();

    let Some((path, format)) = parse_args() else {
        print_usage();
        process::exit(1);
    };

    match render_document(&path, format) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}
