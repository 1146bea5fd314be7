use clap::{Parser, Subcommand};
use notes_search_core::{
    CharacterNgramEmbedder, IngestPipeline, NotesIndex, OcrConfig, OcrProcessor, PdfScanner,
    QdrantStore, QueryEngine, VectorStore, DEFAULT_BATCH_SIZE, DEFAULT_RENDER_DPI,
    DEFAULT_SEARCH_LIMIT,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "notes-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory of the handwritten notes tree
    #[arg(long, env = "NOTES_DIR", default_value = "myNotes")]
    notes_dir: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection name
    #[arg(long, env = "NOTES_COLLECTION", default_value = "handwritten_notes")]
    collection: String,

    /// Rasterization resolution in dots per inch
    #[arg(long, default_value_t = DEFAULT_RENDER_DPI)]
    dpi: u32,

    /// Skip the heavyweight OCR backends and use the deterministic mock
    #[arg(long, default_value_t = false)]
    lightweight_ocr: bool,

    /// Dedicated handwriting OCR endpoint
    #[arg(long, env = "OLMOCR_ENDPOINT")]
    olmocr_endpoint: Option<String>,

    /// OpenAI-compatible vision chat endpoint, used when no OCR endpoint is set
    #[arg(long, env = "VISION_ENDPOINT")]
    vision_endpoint: Option<String>,

    /// Model name for the vision endpoint
    #[arg(long, default_value = "allenai/olmOCR-7B-0225-preview")]
    vision_model: String,

    /// Bearer token for the OCR endpoints
    #[arg(long, env = "OCR_API_KEY")]
    api_key: Option<String>,

    /// Records per upsert batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Discover PDFs under the notes root and print totals.
    Scan,
    /// Ingest the whole tree, or one PDF when a path is given.
    Index {
        /// Single PDF to ingest instead of the whole tree.
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Semantic search over indexed pages.
    Search {
        /// Search query
        query: String,
        /// Number of hits to return.
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// Restrict hits to one course.
        #[arg(long)]
        course: Option<String>,
    },
    /// Remove every indexed page of one PDF.
    Delete {
        /// The pdf_path value the records were indexed under.
        pdf: String,
    },
    /// Collection totals: records, PDFs, courses, confidence.
    Stats,
    /// List indexed pages without their text.
    List,
    /// Create or delete the collection schema.
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
    /// Print a raw record sample with clipped text.
    Debug {
        #[arg(long, default_value = "5")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SchemaAction {
    /// Create the collection; with --force, drop an existing one first.
    Create {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Drop the collection and everything in it.
    Delete,
}

impl Cli {
    fn store(&self) -> QdrantStore {
        QdrantStore::new(&self.qdrant_url, &self.collection)
    }

    fn index(&self) -> NotesIndex<QdrantStore, CharacterNgramEmbedder> {
        NotesIndex::new(self.store(), CharacterNgramEmbedder::default())
    }

    fn ocr(&self) -> OcrProcessor {
        OcrProcessor::new(OcrConfig {
            olmocr_endpoint: self.olmocr_endpoint.clone(),
            vision_endpoint: self.vision_endpoint.clone(),
            vision_model: self.vision_model.clone(),
            api_key: self.api_key.clone(),
            lightweight: self.lightweight_ocr,
            ..OcrConfig::default()
        })
    }

    fn pipeline(&self) -> IngestPipeline<QdrantStore, CharacterNgramEmbedder> {
        let scanner = PdfScanner::new(&self.notes_dir).with_dpi(self.dpi);
        IngestPipeline::new(scanner, self.ocr(), self.index()).with_batch_size(self.batch_size)
    }

    fn ocr_method(&self) -> &'static str {
        self.ocr().method()
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Scan => {
            let scanner = PdfScanner::new(&cli.notes_dir);
            let documents = scanner.discover_pdfs()?;
            for document in &documents {
                println!(
                    "{}  pages={} course={} unit={} size={}B",
                    document.relative_path.display(),
                    document.page_count,
                    document.context.course,
                    document.context.unit,
                    document.size_bytes
                );
            }
            let stats = PdfScanner::scan_stats(&documents);
            println!(
                "{} pdfs, {} pages, {} MB, {} pages/pdf on average",
                stats.total_pdfs, stats.total_pages, stats.total_size_mb,
                stats.average_pages_per_pdf
            );
        }
        Command::Index { pdf } => {
            let store = cli.store();
            store.ready().await?;

            let pipeline = cli.pipeline();
            info!(
                notes_dir = %cli.notes_dir.display(),
                backend = cli.ocr_method(),
                "ingest starting"
            );
            let report = match pdf {
                Some(path) => pipeline.ingest_pdf(path).await?,
                None => pipeline.ingest_all().await?,
            };

            println!(
                "indexed {}/{} pages from {} pdf(s)",
                report.pages_indexed, report.pages_processed, report.pdfs_processed
            );
            for skipped in &report.skipped_pdfs {
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }
        }
        Command::Search {
            query,
            limit,
            course,
        } => {
            let engine = QueryEngine::new(cli.store(), CharacterNgramEmbedder::default());
            let hits = engine.search(query, *limit, course.as_deref()).await;

            if hits.is_empty() {
                println!("no results");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. score={:.4} {} page {} [{} / {}]",
                    rank + 1,
                    hit.score,
                    hit.record.document_title,
                    hit.record.page_number,
                    hit.record.course,
                    hit.record.unit
                );
                let preview: String = hit.record.text.chars().take(160).collect();
                println!("   {}", preview.replace('\n', " "));
            }
        }
        Command::Delete { pdf } => {
            let removed = cli.index().delete_by_source(pdf).await;
            println!("deleted {removed} page record(s) for {pdf}");
        }
        Command::Stats => {
            let stats = cli.index().stats().await?;
            println!("records:            {}", stats.total_documents);
            println!("unique pdfs:        {}", stats.unique_pdfs);
            println!("unique courses:     {}", stats.unique_courses);
            println!("average confidence: {}", stats.average_confidence);
            println!("last indexed:       {}", stats.last_indexed);
        }
        Command::List => {
            let listed = cli.index().list_documents().await;
            for summary in &listed {
                println!(
                    "{} page {}  course={} unit={} method={} confidence={:.2}",
                    summary.pdf_path,
                    summary.page_number,
                    summary.course,
                    summary.unit,
                    summary.ocr_method,
                    summary.confidence
                );
            }
            println!("{} indexed page(s)", listed.len());
        }
        Command::Schema { action } => {
            let index = cli.index();
            match action {
                SchemaAction::Create { force } => {
                    index.create_schema(*force).await?;
                    println!("collection {} ready", cli.collection);
                }
                SchemaAction::Delete => {
                    index.store().drop_collection().await?;
                    println!("collection {} dropped", cli.collection);
                }
            }
        }
        Command::Debug { limit } => {
            for record in cli.index().dump(*limit).await {
                println!(
                    "--- {} page {} ({}, {:.2})",
                    record.pdf_path, record.page_number, record.ocr_method, record.confidence
                );
                println!("{}", record.text);
            }
        }
    }

    Ok(())
}
