//! sv CLI - convert between delimited text formats

use clap::Parser as _;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sv::{
    Config, Escape, JsonLinesParser, JsonLinesStringifier, Parser, RowSink, RowSource,
    Stringifier, SvError, TextEncoding, merge, parse_field_list, shape_adapters, transform,
};

/// Convert between delimited text formats.
///
/// Reads CSV, TSV and similar files (or stdin), optionally drops or keeps
/// columns, and writes delimited text or JSON lines to stdout. The input
/// delimiter and the output header are inferred unless given.
#[derive(clap::Parser, Debug)]
#[command(name = "sv")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file(s); reads stdin when none are given
    files: Vec<PathBuf>,

    /// Input delimiter: a single character, or tab/space (inferred by default)
    #[arg(long, value_parser = parse_byte)]
    input_delimiter: Option<u8>,

    /// Column names for headerless input, comma-separated
    #[arg(long)]
    input_columns: Option<String>,

    /// Read JSON lines instead of delimited text
    #[arg(long)]
    json_input: bool,

    /// Output delimiter: a single character, or tab/space
    #[arg(short = 'd', long, default_value = ",", value_parser = parse_byte)]
    delimiter: u8,

    /// Output column names, comma-separated (skips header inference)
    #[arg(short = 'c', long)]
    columns: Option<String>,

    /// Rows to read before inferring the output header
    #[arg(short = 'p', long, default_value = "1")]
    peek: usize,

    /// Placeholder for absent cells
    #[arg(short = 'm', long, default_value = "")]
    missing: String,

    /// Output line terminator; accepts \n, \r\n and \r escapes
    #[arg(long)]
    newline: Option<String>,

    /// Quote character for input and output
    #[arg(short = 'q', long, default_value = "\"", value_parser = parse_byte)]
    quotechar: u8,

    /// Escape character for input, or 'none'
    #[arg(short = 'e', long, default_value = "\\")]
    escape: String,

    /// How the escape character behaves inside quoted cells
    #[arg(long, value_enum, default_value = "field-end")]
    escape_mode: EscapeMode,

    /// Text encoding label (utf8, latin1, windows-1251, ...) or 'auto'
    #[arg(long, default_value = "utf8")]
    encoding: String,

    /// Keep only these columns, comma-separated (applied after --omit)
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Drop these columns, comma-separated
    #[arg(short = 'o', long)]
    omit: Option<String>,

    /// Write JSON lines instead of delimited text
    #[arg(short = 'j', long)]
    json: bool,

    /// Merge all files into one table with pkid and original_file columns
    #[arg(long, conflicts_with_all = ["json", "json_input", "filter", "omit"])]
    merge: bool,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EscapeMode {
    FieldEnd,
    Always,
}

fn parse_byte(s: &str) -> Result<u8, String> {
    match s {
        "tab" | "\\t" => Ok(b'\t'),
        "space" => Ok(b' '),
        _ => match s.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(format!("expected a single ASCII character, got {s:?}")),
        },
    }
}

fn unescape_newline(s: &str) -> String {
    s.replace("\\r", "\r").replace("\\n", "\n")
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sv: {e}");
            ExitCode::FAILURE
        }
    }
}

fn configs(args: &Args) -> sv::Result<(Config, Config)> {
    let encoding = TextEncoding::from_label(&args.encoding)?;
    let escape = if args.escape.eq_ignore_ascii_case("none") {
        Escape::None
    } else {
        let byte = parse_byte(&args.escape).map_err(SvError::InvalidConfig)?;
        match args.escape_mode {
            EscapeMode::FieldEnd => Escape::FieldEnd(byte),
            EscapeMode::Always => Escape::Always(byte),
        }
    };

    let mut input = Config::new();
    input
        .encoding(encoding)
        .missing(args.missing.as_str())
        .quote(args.quotechar)
        .escape(escape);
    if let Some(delimiter) = args.input_delimiter {
        input.delimiter(delimiter);
    }
    if let Some(columns) = &args.input_columns {
        input.columns(parse_field_list(columns));
    }

    let mut output = Config::new();
    output
        .encoding(encoding)
        .missing(args.missing.as_str())
        .delimiter(args.delimiter)
        .quote(args.quotechar)
        .peek(args.peek);
    if let Some(newline) = &args.newline {
        output.newline(unescape_newline(newline));
    }
    if let Some(columns) = &args.columns {
        output.columns(parse_field_list(columns));
    }

    Ok((input, output))
}

fn run(args: &Args) -> sv::Result<()> {
    let (input_config, output_config) = configs(args)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.merge {
        if args.files.is_empty() {
            return Err(SvError::InvalidConfig("--merge needs input files".to_string()));
        }
        merge(&args.files, &input_config, &output_config, &mut out)?;
        return Ok(());
    }

    if args.files.is_empty() {
        convert(args, &input_config, &output_config, io::stdin().lock(), &mut out)?;
        return Ok(());
    }

    // One file at a time, each with its own header.
    for path in &args.files {
        let file = File::open(path).map_err(|source| file_error(path, source))?;
        let finished = convert(args, &input_config, &output_config, file, &mut out)?;
        if !finished {
            break;
        }
    }
    Ok(())
}

/// Convert one input. Returns false if the output was closed.
fn convert<R: Read, W: Write>(
    args: &Args,
    input_config: &Config,
    output_config: &Config,
    input: R,
    out: &mut W,
) -> sv::Result<bool> {
    let mut source: Box<dyn RowSource> = if args.json_input {
        Box::new(JsonLinesParser::new())
    } else {
        Box::new(Parser::new(input_config.clone())?)
    };
    let mut sink: Box<dyn RowSink + '_> = if args.json {
        Box::new(JsonLinesStringifier::new(output_config, out))
    } else {
        Box::new(Stringifier::new(output_config, out)?)
    };
    let adapters = shape_adapters(args.omit.as_deref(), args.filter.as_deref());

    let summary = transform(input, source.as_mut(), &adapters, sink.as_mut())?;
    tracing::debug!(
        rows_read = summary.rows_read,
        rows_written = summary.rows_written,
        "converted"
    );
    Ok(!summary.truncated)
}

fn file_error(path: &Path, source: io::Error) -> SvError {
    SvError::File {
        path: path.to_path_buf(),
        source,
    }
}
