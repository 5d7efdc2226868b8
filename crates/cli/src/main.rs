use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use seqio_core::cache::cache_config::CacheConfig;
use seqio_core::codec::domain::io_plugin::{IoInfo, ReadRequest};
use seqio_core::playback::domain::video_queue::VideoQueue;
use seqio_core::playback::infrastructure::threaded_sequence_reader::{
    Direction, ReaderConfig, SequenceReader,
};
use seqio_core::registry::io_factory::IoFactory;
use seqio_core::registry::option_store::PluginOptionStore;
use seqio_core::sequence::domain::file_info::{FileInfo, FileKind};
use seqio_core::sequence::domain::frame_sequence::CompressMode;
use seqio_core::sequence::domain::list_options::{DirectoryListOptions, SortKey};
use seqio_core::sequence::infrastructure::directory_scanner::{eval_sequence, list_directory};
use seqio_core::shared::constants::GIGABYTE;
use seqio_core::shared::image::Proxy;

const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Inspect, convert and play back image sequences.
#[derive(Parser)]
#[command(name = "seqio")]
struct Cli {
    /// Plugin option file (JSON). Defaults to the user config directory.
    #[arg(long, global = true)]
    options_file: Option<PathBuf>,

    /// Write the resulting plugin options back to the option file.
    #[arg(long, global = true)]
    save_options: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show layers, pixel types and tags of a file or sequence.
    Info { path: String },

    /// List a directory, grouping numbered files into sequences.
    Ls {
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// List every numbered file on its own.
        #[arg(long)]
        no_sequences: bool,

        /// Include dot files.
        #[arg(long)]
        hidden: bool,

        /// Sort key: name, size, time or type.
        #[arg(long, default_value = "name")]
        sort: SortKey,

        #[arg(long)]
        reverse: bool,

        /// Frame list rendering: off, sparse or range.
        #[arg(long, default_value = "sparse")]
        compress: CompressMode,
    },

    /// Convert a file or sequence to another format.
    Convert {
        input: String,
        output: String,

        /// Plugin option as plugin.name=value (repeatable).
        #[arg(long = "option", value_name = "PLUGIN.NAME=VALUE")]
        options: Vec<String>,

        /// Downscale factor: 1, 2, 4 or 8.
        #[arg(long, default_value = "1")]
        proxy: u32,
    },

    /// Decode a sequence through the read-ahead queue and report throughput.
    Play {
        path: String,

        /// Cache budget in gigabytes (overrides the stored cache settings).
        #[arg(long)]
        cache_gb: Option<f64>,

        /// Read-ahead queue depth.
        #[arg(long)]
        queue: Option<usize>,

        #[arg(long)]
        reverse: bool,

        /// Times to play the range.
        #[arg(long, default_value = "1")]
        loop_count: usize,
    },

    /// List registered plugins with their extensions and options.
    Plugins,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut factory = IoFactory::with_default_plugins();
    let options_path = cli.options_file.clone().or_else(PluginOptionStore::default_path);
    if let Some(path) = options_path.as_deref().filter(|p| p.exists()) {
        let applied = PluginOptionStore::load(path)?.apply(&mut factory);
        log::debug!("applied {applied} stored plugin options from {}", path.display());
    }

    match cli.command {
        Command::Info { path } => run_info(&factory, &path)?,
        Command::Ls {
            dir,
            no_sequences,
            hidden,
            sort,
            reverse,
            compress,
        } => {
            let options = DirectoryListOptions {
                sequences: !no_sequences,
                sequence_extensions: factory.sequence_extensions(),
                show_hidden: hidden,
                sort,
                reverse,
                ..DirectoryListOptions::default()
            };
            run_ls(&dir, &options, compress)?;
        }
        Command::Convert {
            input,
            output,
            options,
            proxy,
        } => {
            for option in &options {
                let (plugin, name, value) = parse_option(option)?;
                factory.set_option(plugin, name, value)?;
            }
            let proxy = Proxy::from_scale(proxy).ok_or("proxy must be 1, 2, 4 or 8")?;
            run_convert(&factory, &input, &output, proxy)?;
        }
        Command::Play {
            path,
            cache_gb,
            queue,
            reverse,
            loop_count,
        } => {
            let mut config = CacheConfig::load_or_default();
            if let Some(size_gb) = cache_gb {
                config.size_gb = size_gb;
            }
            if let Some(depth) = queue {
                config.read_ahead = depth;
            }
            run_play(&factory, &path, &config, reverse, loop_count)?;
        }
        Command::Plugins => run_plugins(&factory),
    }

    if cli.save_options {
        let path = options_path.ok_or("no config directory for the option file")?;
        PluginOptionStore::capture(&factory).save(&path)?;
        log::info!("Plugin options written to {}", path.display());
    }
    Ok(())
}

/// Parses the path and merges every sibling frame on disk.
fn open_file(path: &str) -> Result<FileInfo, Box<dyn std::error::Error>> {
    Ok(eval_sequence(&FileInfo::parse(path))?)
}

fn run_info(factory: &IoFactory, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let file = open_file(path)?;
    let load = factory.load(&file)?;
    let info = load.info();

    println!("{}{}", file.directory(), file.format(CompressMode::Sparse));
    if !info.sequence.is_empty() {
        println!("  frames: {} ({})", info.sequence.len(), info.sequence.compress(CompressMode::Range));
    }
    for (index, layer) in info.layers.iter().enumerate() {
        let name = if layer.layer_name.is_empty() {
            "default"
        } else {
            layer.layer_name.as_str()
        };
        println!("  layer {index} [{name}]: {}x{} {}", layer.width, layer.height, layer.pixel);
        for (key, value) in layer.tags.iter() {
            println!("    {key}: {value}");
        }
    }
    Ok(())
}

fn run_ls(dir: &Path, options: &DirectoryListOptions, compress: CompressMode) -> Result<(), Box<dyn std::error::Error>> {
    for entry in list_directory(dir, options)? {
        let kind = match entry.kind() {
            FileKind::Directory => "dir",
            FileKind::Sequence => "seq",
            FileKind::File => "file",
        };
        println!("{kind:<4} {:>12}  {}", entry.size(), entry.format(compress));
    }
    Ok(())
}

fn run_convert(factory: &IoFactory, input: &str, output: &str, proxy: Proxy) -> Result<(), Box<dyn std::error::Error>> {
    let source = open_file(input)?;
    let target = FileInfo::parse(output);
    let mut load = factory.load(&source)?;

    let frames: Vec<Option<i64>> = if load.info().sequence.is_empty() {
        vec![None]
    } else {
        load.info().sequence.frames().map(Some).collect()
    };
    if frames.len() > 1 && !target.has_number() {
        return Err(format!("{output}: a numbered output name is needed for {} frames", frames.len()).into());
    }

    let mut layer = load.info().first_layer().ok_or("input has no layers")?.clone();
    layer.width = proxy.scale_dimension(layer.width);
    layer.height = proxy.scale_dimension(layer.height);
    let mut save = factory.save(&target, &IoInfo::new(layer))?;

    let total = frames.len();
    for (index, frame) in frames.into_iter().enumerate() {
        let mut request = ReadRequest::new().with_proxy(proxy);
        request.frame = frame;
        let image = load.read(&request)?;
        let output_frame = if target.has_number() { frame.or(target.sequence().first()) } else { None };
        save.write(&image, output_frame)?;
        eprint!("\rConverting frame {}/{total}", index + 1);
    }
    save.close()?;
    eprintln!();
    log::info!("Output written to {output}");
    Ok(())
}

fn run_play(
    factory: &IoFactory,
    path: &str,
    config: &CacheConfig,
    reverse: bool,
    loop_count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = open_file(path)?;
    let load = factory.load(&file)?;
    let cache = Arc::new(config.build_cache());
    let queue = Arc::new(VideoQueue::new(config.read_ahead));
    let frame_count = load.info().sequence.len().max(1);
    let reader_config = ReaderConfig {
        direction: if reverse { Direction::Reverse } else { Direction::Forward },
        looping: loop_count > 1,
        ..ReaderConfig::default()
    };

    let started = Instant::now();
    let mut reader = SequenceReader::spawn(load, Arc::clone(&cache), Arc::clone(&queue), reader_config);
    let target = frame_count * loop_count;
    let mut played = 0;
    while played < target {
        match queue.try_pop_frame() {
            Some(_) => played += 1,
            None if queue.is_drained() => break,
            None => std::thread::sleep(DRAIN_POLL),
        }
    }
    let cached_bytes = cache.byte_count();
    reader.close();

    let seconds = started.elapsed().as_secs_f64();
    let fps = if seconds > 0.0 { played as f64 / seconds } else { 0.0 };
    println!("{played} frames in {seconds:.2}s ({fps:.1} fps)");
    println!(
        "cache: {:.3} of {:.3} GB",
        cached_bytes as f64 / GIGABYTE as f64,
        cache.max_bytes() as f64 / GIGABYTE as f64
    );
    Ok(())
}

fn run_plugins(factory: &IoFactory) {
    for name in factory.plugin_names() {
        let Some(plugin) = factory.plugin(name) else {
            continue;
        };
        println!("{name}: {}", plugin.extensions().join(" "));
        for option in plugin.option_names() {
            let value = plugin.option(option).unwrap_or_default();
            let domain = plugin.option_domain(option).unwrap_or_default();
            if domain.is_empty() {
                println!("  {option} = {value}");
            } else {
                println!("  {option} = {value} [{}]", domain.join(", "));
            }
        }
    }
}

/// Splits `plugin.name=value`.
fn parse_option(text: &str) -> Result<(&str, &str, &str), Box<dyn std::error::Error>> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("option must look like plugin.name=value, got '{text}'"))?;
    let (plugin, name) = key
        .split_once('.')
        .ok_or_else(|| format!("option must look like plugin.name=value, got '{text}'"))?;
    Ok((plugin.trim(), name.trim(), value.trim()))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Play {
            cache_gb,
            queue,
            loop_count,
            ..
        } => {
            if let Some(gb) = cache_gb {
                if !gb.is_finite() || *gb < 0.0 {
                    return Err(format!("Cache size must be a non-negative number, got {gb}").into());
                }
            }
            if *queue == Some(0) {
                return Err("Queue depth must be at least 1".into());
            }
            if *loop_count == 0 {
                return Err("Loop count must be at least 1".into());
            }
        }
        Command::Ls { dir, .. } if !dir.is_dir() => {
            return Err(format!("Not a directory: {}", dir.display()).into());
        }
        _ => {}
    }
    Ok(())
}
