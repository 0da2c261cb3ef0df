use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdfdelta::graphics::Shape;
use pdfdelta::objects::{Object, ObjectId};
use pdfdelta::parser::XRefEntry;
use pdfdelta::writer::ObjectWriter;
use pdfdelta::{Document, DocumentOptions, ParseOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdfdelta",
    about = "Inspect PDF files and append incremental revisions",
    version,
    author
)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Refuse to rebuild a damaged cross-reference index
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, object count and page count
    Info {
        /// Input PDF file
        input: PathBuf,
    },

    /// List cross-reference entries
    Objects {
        /// Input PDF file
        input: PathBuf,

        /// Include free entries
        #[arg(short, long)]
        all: bool,
    },

    /// Print one resolved object
    Show {
        /// Input PDF file
        input: PathBuf,

        /// Object number
        number: u32,

        /// Generation number
        #[arg(default_value = "0")]
        generation: u16,
    },

    /// Interpret a page and summarize the shapes it draws
    Shapes {
        /// Input PDF file
        input: PathBuf,

        /// Page number, 1-based
        page: usize,
    },

    /// Append a revision that deletes an object
    Delete {
        /// Input PDF file
        input: PathBuf,

        /// Object number
        number: u32,

        /// Generation number
        #[arg(default_value = "0")]
        generation: u16,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = if cli.strict {
        DocumentOptions::default().with_parse(ParseOptions::strict())
    } else {
        DocumentOptions::default()
    };

    match cli.command {
        Commands::Info { input } => {
            let document = open(&input, options)?;
            println!("PDF Information for: {}", input.display());
            println!("==========================================");
            match document.version() {
                Some(version) => println!("PDF Version: {version}"),
                None => println!("PDF Version: unknown"),
            }
            println!("Objects: {}", document.object_count());
            println!("Recovered: {}", if document.is_recovered() { "yes" } else { "no" });
            let pages = document.page_count().context("Failed to read the page tree")?;
            println!("Pages: {pages}");
            if document.trailer().is_encrypted() {
                println!("Encrypted: yes");
            }
        }

        Commands::Objects { input, all } => {
            let document = open(&input, options)?;
            for (number, entry) in document.xref().iter() {
                match entry {
                    XRefEntry::Used { offset, generation } => {
                        println!("{number:>6} {generation:>5}  offset {offset}")
                    }
                    XRefEntry::Compressed { container, index } => {
                        println!("{number:>6} {:>5}  in stream {container} at {index}", 0)
                    }
                    XRefEntry::Free { next_free, generation } if all => {
                        println!("{number:>6} {generation:>5}  free, next {next_free}")
                    }
                    XRefEntry::Free { .. } => {}
                }
            }
        }

        Commands::Show {
            input,
            number,
            generation,
        } => {
            let document = open(&input, options)?;
            let id = ObjectId::new(number, generation);
            let object = document.resolve(id);
            if document.is_missing(&object) {
                bail!("Object {} is not present in {}", id, input.display());
            }
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            write_object(&mut out, &object)?;
            writeln!(out)?;
        }

        Commands::Shapes { input, page } => {
            let document = open(&input, options)?;
            if page == 0 {
                bail!("Page numbers start at 1");
            }
            let shapes = document
                .interpret_page(page - 1)
                .with_context(|| format!("Failed to interpret page {page}"))?;
            for (i, shape) in shapes.iter().enumerate() {
                println!("{i:>5}  {}", describe(shape));
            }
            println!("{} shapes", shapes.len());
            if shapes.is_incomplete() {
                println!("(incomplete)");
            }
        }

        Commands::Delete {
            input,
            number,
            generation,
            output,
        } => {
            let document = open(&input, options)?;
            let id = ObjectId::new(number, generation);
            if document.xref().get(number).map_or(true, |entry| entry.is_free()) {
                bail!("Object {} is not in use in {}", id, input.display());
            }
            document.delete_object(id);

            let file = File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let mut writer = BufWriter::new(file);
            let written = document
                .append_revision(&mut writer)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            writer.flush()?;
            println!("Deleted {} and wrote {} bytes to {}", id, written, output.display());
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path, options: DocumentOptions) -> Result<Document> {
    let document = Document::open_file(path, options)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    debug!("Opened {:?}", document);
    Ok(document)
}

/// Object syntax, with stream bodies replaced by their length.
fn write_object(out: &mut impl Write, object: &Object) -> Result<()> {
    let mut writer = ObjectWriter::new(Vec::new(), 0);
    match object {
        Object::Stream(stream) => {
            writer.write_value(&Object::Dictionary(stream.dictionary().clone()), None)?;
            out.write_all(&writer.into_inner())?;
            write!(out, "\nstream ({} bytes)", stream.raw_data().len())?;
        }
        other => {
            writer.write_value(other, None)?;
            out.write_all(&writer.into_inner())?;
        }
    }
    Ok(())
}

fn describe(shape: &Shape) -> String {
    match shape {
        Shape::Path(path) => format!("path, {} segments", path.commands().len()),
        Shape::Fill { paint, alpha, rule } => format!("fill {paint:?} alpha {alpha} {rule:?}"),
        Shape::Stroke { paint, alpha, style } => {
            format!("stroke {paint:?} alpha {alpha} width {}", style.width)
        }
        Shape::PatternPaint { name, stroke, .. } => {
            format!("pattern /{name} for {}", if *stroke { "stroke" } else { "fill" })
        }
        Shape::Shading { name, .. } => format!("shading /{name}"),
        Shape::Clip { rule, .. } => format!("clip {rule:?}"),
        Shape::ClipRect(rect) => format!("clip to {}x{}", rect.width(), rect.height()),
        Shape::ResetClip(_) => "reset clip".to_string(),
        Shape::TextRun(run) => {
            let origin = run.origin();
            format!(
                "text {:?} at ({:.2}, {:.2}) size {} advance {:.3}",
                String::from_utf8_lossy(&run.bytes),
                origin.x,
                origin.y,
                run.font_size,
                run.advance
            )
        }
        Shape::ClipText(runs) => format!("clip to {} text runs", runs.len()),
        Shape::Image(image) => {
            let name = image.name.as_deref().unwrap_or("inline");
            format!("image /{name}, {} bytes", image.data.len())
        }
        Shape::BeginMarkedContent { tag, .. } => format!("begin marked content /{tag}"),
        Shape::EndMarkedContent => "end marked content".to_string(),
    }
}
