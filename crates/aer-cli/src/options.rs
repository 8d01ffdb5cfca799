//! Pipeline options from `--config` with CLI flag overrides.

use anyhow::{Context, Result};

use aer_core::PipelineContext;
use aer_model::PipelineOptions;

use crate::cli::PipelineArgs;

/// Loads the config file when given, applies flag overrides and validates.
pub fn resolve_options(args: &PipelineArgs) -> Result<PipelineOptions> {
    let mut options = match &args.config {
        Some(path) => PipelineOptions::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => PipelineOptions::default(),
    };
    if let Some(dir) = &args.vocab_dir {
        options.vocab_dir = Some(dir.clone());
    }
    let engine = &mut options.engine;
    if let Some(rows) = args.chunk_size {
        engine.chunk_size = rows;
    }
    if let Some(workers) = args.workers {
        engine.workers = workers;
    }
    if let Some(keys) = args.index_batch_size {
        engine.index_batch_size = keys;
    }
    if let Some(rows) = args.in_memory_threshold {
        engine.in_memory_threshold = rows;
    }
    if let Some(join_type) = args.join_type {
        engine.join_type = join_type.into();
    }
    if let Some(coercion) = args.coercion {
        engine.coercion = coercion.into();
    }
    if args.no_verify {
        engine.verify_integrity = false;
    }
    let resolver = &mut options.resolver;
    if let Some(hops) = args.ingredient_max_depth {
        resolver.ingredient_max_depth = hops;
    }
    if let Some(hops) = args.hierarchy_max_depth {
        resolver.hierarchy_max_depth = hops;
    }
    options.validate().context("invalid pipeline options")?;
    Ok(options)
}

pub fn build_context(args: &PipelineArgs) -> Result<PipelineContext> {
    let options = resolve_options(args)?;
    Ok(PipelineContext::new(&args.data_dir, &args.out_dir).with_options(options))
}
