use anyhow::{Context, Result, anyhow};
use tracing::{info, info_span};

use aer_cli::cli::{Command, PipelineArgs, ResolveArgs};
use aer_cli::options::build_context;
use aer_core::{Stage, StageOutcome, Standardizer, run_all, run_stage};

use crate::summary::{print_explanations, print_outcome};

pub fn run_command(command: &Command, args: &PipelineArgs) -> Result<()> {
    match command {
        Command::Entities => run_single(Stage::Entities, args),
        Command::Standardize => run_single(Stage::Standardize, args),
        Command::Baseline => run_single(Stage::Baseline, args),
        Command::Pairs => run_single(Stage::Pairs, args),
        Command::Qa => run_single(Stage::Qa, args),
        Command::Cohorts => run_single(Stage::Cohorts, args),
        Command::Run => {
            for outcome in &run_pipeline(args)? {
                print_outcome(outcome);
            }
            Ok(())
        }
        Command::Resolve(resolve) => run_resolve(resolve, args),
    }
}

fn run_single(stage: Stage, args: &PipelineArgs) -> Result<()> {
    let ctx = build_context(args)?;
    let outcome = run_stage(&ctx, stage).with_context(|| format!("{stage} stage failed"))?;
    print_outcome(&outcome);
    Ok(())
}

fn run_pipeline(args: &PipelineArgs) -> Result<Vec<StageOutcome>> {
    let ctx = build_context(args)?;
    info!(
        data_dir = %ctx.data_dir.display(),
        out_dir = %ctx.out_dir.display(),
        "starting pipeline"
    );
    run_all(&ctx).context("pipeline failed")
}

fn run_resolve(resolve: &ResolveArgs, args: &PipelineArgs) -> Result<()> {
    let _span = info_span!("resolve", ids = resolve.concept_ids.len()).entered();
    let ctx = build_context(args)?;
    let store = ctx.load_vocabulary().context("load vocabulary")?;
    let mut standardizer = Standardizer::new(&store, &ctx.options.resolver)?;
    let mut explanations = Vec::with_capacity(resolve.concept_ids.len());
    for &id in &resolve.concept_ids {
        let explanation = standardizer
            .explain(id)
            .ok_or_else(|| anyhow!("concept {id} is not in the vocabulary"))?;
        explanations.push(explanation);
    }
    if resolve.json {
        let text = serde_json::to_string_pretty(&explanations).context("serialize resolutions")?;
        println!("{text}");
    } else {
        print_explanations(&store, &explanations);
    }
    Ok(())
}
