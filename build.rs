use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct ConfigSection {
    page_size: Option<usize>,
    max_bytes: Option<usize>,
    span_pages: Option<usize>,
    max_delay_count: Option<usize>,
    delay_interval_ms: Option<u64>,
    thread_cache_class_bytes: Option<usize>,
    min_cached_blocks: Option<usize>,
    max_cached_blocks: Option<usize>,
    max_fetch_batch: Option<usize>,
    max_span_trackers: Option<usize>,
    max_recycle_pages: Option<usize>,
    max_cached_span_pages: Option<usize>,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
}

struct ResolvedConfig {
    page_size: usize,
    max_bytes: usize,
    span_pages: usize,
    max_delay_count: usize,
    delay_interval_ms: u64,
    thread_cache_class_bytes: usize,
    min_cached_blocks: usize,
    max_cached_blocks: usize,
    max_fetch_batch: usize,
    max_span_trackers: usize,
    max_recycle_pages: usize,
    max_cached_span_pages: usize,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let page_size = cfg.page_size.unwrap_or(4096);
    assert!(
        page_size.is_power_of_two(),
        "page_size ({}) must be a power of 2",
        page_size
    );
    assert!(
        page_size >= 4096,
        "page_size ({}) must be >= 4096",
        page_size
    );

    let max_bytes = cfg.max_bytes.unwrap_or(256 * 1024);
    assert!(
        max_bytes.is_multiple_of(8),
        "max_bytes ({}) must be 8-byte aligned",
        max_bytes
    );
    assert!(
        max_bytes >= page_size,
        "max_bytes ({}) must be >= page_size ({})",
        max_bytes,
        page_size
    );

    let span_pages = cfg.span_pages.unwrap_or(8);
    let max_delay_count = cfg.max_delay_count.unwrap_or(64);
    let delay_interval_ms = cfg.delay_interval_ms.unwrap_or(1000);
    let thread_cache_class_bytes = cfg.thread_cache_class_bytes.unwrap_or(64 * 1024);
    let min_cached_blocks = cfg.min_cached_blocks.unwrap_or(2);
    let max_cached_blocks = cfg.max_cached_blocks.unwrap_or(512);
    let max_fetch_batch = cfg.max_fetch_batch.unwrap_or(64);
    let max_span_trackers = cfg.max_span_trackers.unwrap_or(4096);
    let max_recycle_pages = cfg.max_recycle_pages.unwrap_or(64);
    let max_cached_span_pages = cfg.max_cached_span_pages.unwrap_or(4096);

    assert!(span_pages > 0, "span_pages must be > 0");
    assert!(max_delay_count > 0, "max_delay_count must be > 0");
    assert!(delay_interval_ms > 0, "delay_interval_ms must be > 0");
    assert!(
        thread_cache_class_bytes > 0,
        "thread_cache_class_bytes must be > 0"
    );
    assert!(min_cached_blocks > 0, "min_cached_blocks must be > 0");
    assert!(
        max_cached_blocks >= min_cached_blocks,
        "max_cached_blocks ({}) must be >= min_cached_blocks ({})",
        max_cached_blocks,
        min_cached_blocks
    );
    assert!(max_fetch_batch > 0, "max_fetch_batch must be > 0");
    assert!(max_span_trackers > 0, "max_span_trackers must be > 0");
    assert!(max_recycle_pages > 0, "max_recycle_pages must be > 0");
    assert!(
        max_cached_span_pages >= max_recycle_pages,
        "max_cached_span_pages ({}) must be >= max_recycle_pages ({})",
        max_cached_span_pages,
        max_recycle_pages
    );
    // Spans carved for the largest size class must still be recyclable.
    assert!(
        max_recycle_pages * page_size >= max_bytes,
        "max_recycle_pages * page_size ({}) must cover max_bytes ({})",
        max_recycle_pages * page_size,
        max_bytes
    );

    ResolvedConfig {
        page_size,
        max_bytes,
        span_pages,
        max_delay_count,
        delay_interval_ms,
        thread_cache_class_bytes,
        min_cached_blocks,
        max_cached_blocks,
        max_fetch_batch,
        max_span_trackers,
        max_recycle_pages,
        max_cached_span_pages,
    }
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{}/mempool.toml", manifest_dir)
}

fn generate_config(cfg: &ResolvedConfig, out_path: &Path) {
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         pub const PAGE_SIZE: usize = {};\n\
         pub const MAX_BYTES: usize = {};\n\
         pub const SPAN_PAGES: usize = {};\n\
         pub const MAX_DELAY_COUNT: usize = {};\n\
         pub const DELAY_INTERVAL_MS: u64 = {};\n\
         pub const THREAD_CACHE_CLASS_BYTES: usize = {};\n\
         pub const MIN_CACHED_BLOCKS: usize = {};\n\
         pub const MAX_CACHED_BLOCKS: usize = {};\n\
         pub const MAX_FETCH_BATCH: usize = {};\n\
         pub const MAX_SPAN_TRACKERS: usize = {};\n\
         pub const MAX_RECYCLE_PAGES: usize = {};\n\
         pub const MAX_CACHED_SPAN_PAGES: usize = {};\n",
        cfg.page_size,
        cfg.max_bytes,
        cfg.span_pages,
        cfg.max_delay_count,
        cfg.delay_interval_ms,
        cfg.thread_cache_class_bytes,
        cfg.min_cached_blocks,
        cfg.max_cached_blocks,
        cfg.max_fetch_batch,
        cfg.max_span_trackers,
        cfg.max_recycle_pages,
        cfg.max_cached_span_pages,
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn main() {
    println!("cargo:rerun-if-env-changed=MEMPOOL_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = env::var("MEMPOOL_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={}", config_path);
    let content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", config_path, e));

    let config: Config = toml::from_str(&content).expect("failed to parse TOML config");
    let resolved = resolve_config(&config.config);

    generate_config(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
