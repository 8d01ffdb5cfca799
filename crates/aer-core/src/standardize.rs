//! Standardization of drug and reaction mentions against the vocabulary.
//!
//! Drugs map onto RxNorm (by RxCUI code, or by product name for free-text
//! mentions), flatten into ingredients and pick up their ATC 5th codes.
//! Reactions map onto MedDRA preferred terms by name and climb the MedDRA
//! hierarchy to their system organ class. Mentions that fail to map are kept
//! out of the resolved tables and counted; the QA stage lists them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span};

use aer_model::{
    ColumnContract, Concept, ConceptId, DrugMention, MEDDRA_SNOMED_EQ, REPORT_KEY_COLUMN,
    ReactionMention, ReportKey, ResolvedIngredient, ResolverOptions, Table, TopLevelCategory,
    concept_class, vocabulary,
};
use aer_report::StageStats;
use aer_vocab::{
    ClassificationMapper, ConceptMapper, HierarchyPath, HierarchyResolver, IngredientResolver,
    VocabularyStore, write_snapshot,
};

use crate::context::PipelineContext;
use crate::error::Result;
use crate::stage::{Stage, StageOutcome, write_output};

const STAGE: &str = "standardize";

pub const RXNORM_SNAPSHOT: &str = "rxnorm_concept_ids.json.gz";
pub const MEDDRA_SNAPSHOT: &str = "meddra_concept_ids.json.gz";

/// An ingredient reached from a drug concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngredientHit {
    pub concept_id: ConceptId,
    /// Zero when the drug concept is itself an ingredient.
    pub hops: usize,
}

/// Everything the resolvers know about one concept.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptExplanation {
    pub concept: Concept,
    pub ingredients: Vec<IngredientHit>,
    pub atc_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchyPath>,
    pub snomed: Vec<ConceptId>,
}

/// Mappers and resolvers over one vocabulary snapshot, with per-concept
/// memoization of traversal results.
pub struct Standardizer<'s> {
    store: &'s VocabularyStore,
    rxnorm: ConceptMapper<'s>,
    preferred_terms: ConceptMapper<'s>,
    ingredient_resolver: IngredientResolver<'s>,
    hierarchy: HierarchyResolver<'s>,
    atc: ClassificationMapper<'s>,
    snomed: ClassificationMapper<'s>,
    ingredient_cache: HashMap<ConceptId, Vec<IngredientHit>>,
    hierarchy_cache: HashMap<ConceptId, Option<HierarchyPath>>,
}

impl<'s> Standardizer<'s> {
    pub fn new(store: &'s VocabularyStore, options: &ResolverOptions) -> Result<Self> {
        let hierarchy = HierarchyResolver::new(
            store,
            &options.hierarchy_levels,
            options.hierarchy_max_depth,
        )?
        .with_vocabulary(Some(vocabulary::MEDDRA));
        let top_class = options
            .hierarchy_levels
            .first()
            .map_or(concept_class::PT, String::as_str);
        Ok(Self {
            store,
            rxnorm: ConceptMapper::new(store, vocabulary::RXNORM, None),
            preferred_terms: ConceptMapper::new(store, vocabulary::MEDDRA, Some(top_class)),
            ingredient_resolver: IngredientResolver::new(store, options.ingredient_max_depth)
                .standard_only(options.standard_only),
            hierarchy,
            atc: ClassificationMapper::new(store, vocabulary::ATC, Some(concept_class::ATC_5TH)),
            snomed: ClassificationMapper::new(store, vocabulary::SNOMED, None).via(MEDDRA_SNOMED_EQ),
            ingredient_cache: HashMap::new(),
            hierarchy_cache: HashMap::new(),
        })
    }

    pub fn store(&self) -> &'s VocabularyStore {
        self.store
    }

    /// RxNorm concept of an RxCUI.
    pub fn rxnorm_by_code(&self, rxcui: &str) -> Option<&'s Concept> {
        self.rxnorm.map_code(rxcui)
    }

    /// RxNorm concept of a product name.
    pub fn rxnorm_by_name(&self, product: &str) -> Option<&'s Concept> {
        self.rxnorm.map_name(product)
    }

    /// Preferred term of a reaction name.
    pub fn preferred_term(&self, reaction: &str) -> Option<&'s Concept> {
        self.preferred_terms.map_name(reaction)
    }

    /// Mapper collisions resolved to the lowest id, per partition.
    pub fn collisions(&self) -> BTreeMap<&'static str, u64> {
        BTreeMap::from([
            ("rxnorm", self.rxnorm.collisions()),
            ("meddra_pt", self.preferred_terms.collisions()),
        ])
    }

    /// Ingredients of a drug concept, ordered by id.
    pub fn ingredients(&mut self, drug: ConceptId) -> Vec<IngredientHit> {
        if let Some(hits) = self.ingredient_cache.get(&drug) {
            return hits.clone();
        }
        let hits = match self.store.concept(drug) {
            Some(concept)
                if concept.is_class(concept_class::INGREDIENT)
                    && concept.in_vocabulary(vocabulary::RXNORM) =>
            {
                vec![IngredientHit {
                    concept_id: drug,
                    hops: 0,
                }]
            }
            Some(_) => {
                let mut hits: Vec<IngredientHit> = self
                    .ingredient_resolver
                    .resolve_one(drug)
                    .into_iter()
                    .map(|resolution| IngredientHit {
                        concept_id: resolution.target,
                        hops: resolution.hops,
                    })
                    .collect();
                hits.sort_by_key(|hit| (hit.concept_id, hit.hops));
                hits.dedup_by_key(|hit| hit.concept_id);
                hits
            }
            None => Vec::new(),
        };
        self.ingredient_cache.insert(drug, hits.clone());
        hits
    }

    pub fn top_level_path(&mut self, term: ConceptId) -> Option<HierarchyPath> {
        if let Some(path) = self.hierarchy_cache.get(&term) {
            return path.clone();
        }
        let path = self.hierarchy.resolve_one(term);
        self.hierarchy_cache.insert(term, path.clone());
        path
    }

    pub fn atc_codes(&self, ingredient: ConceptId) -> Vec<String> {
        self.atc.codes(ingredient)
    }

    pub fn atc_concepts(&self, ingredient: ConceptId) -> Vec<&'s Concept> {
        self.atc.map(ingredient)
    }

    pub fn snomed_concepts(&self, term: ConceptId) -> Vec<&'s Concept> {
        self.snomed.map(term)
    }

    /// Resolves one drug mention; a non-empty cleaned text is mapped in
    /// place of the raw product.
    pub fn drug_mention(
        &mut self,
        report_key: ReportKey,
        product: &str,
        cleaned: Option<&str>,
    ) -> DrugMention {
        let text = cleaned.filter(|text| !text.trim().is_empty()).unwrap_or(product);
        let product_concept = self.rxnorm_by_name(text).map(|concept| concept.concept_id);
        let ingredients = match product_concept {
            Some(id) => self
                .ingredients(id)
                .into_iter()
                .filter_map(|hit| {
                    let concept = self.store.concept(hit.concept_id)?;
                    Some(ResolvedIngredient {
                        concept_id: hit.concept_id,
                        name: concept.concept_name.clone(),
                        classification_codes: self.atc_codes(hit.concept_id),
                    })
                })
                .collect(),
            None => Vec::new(),
        };
        DrugMention {
            report_key,
            product: product.to_string(),
            product_concept,
            ingredients,
        }
    }

    pub fn reaction_mention(&mut self, report_key: ReportKey, reaction: &str) -> ReactionMention {
        let term = self.preferred_term(reaction);
        let top_level = term
            .and_then(|concept| self.top_level_path(concept.concept_id))
            .and_then(|path| {
                let top = self.store.concept(path.top_level)?;
                Some(TopLevelCategory {
                    concept_id: top.concept_id,
                    code: top.concept_code.clone(),
                    name: top.concept_name.clone(),
                })
            });
        ReactionMention {
            report_key,
            reaction: reaction.to_string(),
            term_concept: term.map(|concept| concept.concept_id),
            term_code: term.map(|concept| concept.concept_code.clone()),
            top_level,
        }
    }

    pub fn explain(&mut self, id: ConceptId) -> Option<ConceptExplanation> {
        let concept = self.store.concept(id)?.clone();
        let ingredients = self.ingredients(id);
        let atc_codes = ingredients
            .iter()
            .flat_map(|hit| self.atc_codes(hit.concept_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Some(ConceptExplanation {
            concept,
            ingredients,
            atc_codes,
            hierarchy: self.top_level_path(id),
            snomed: self
                .snomed_concepts(id)
                .into_iter()
                .map(|concept| concept.concept_id)
                .collect(),
        })
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn concept_cells(concept: &Concept) -> [String; 4] {
    [
        concept.concept_id.to_string(),
        concept.concept_code.clone(),
        concept.concept_name.clone(),
        concept.concept_class_id.clone(),
    ]
}

/// Column name of one hierarchy level (`HLGT` → `hlgt_concept_id`).
fn level_column(level: &str, suffix: &str) -> String {
    format!("{}_{suffix}", level.to_lowercase().replace(' ', "_"))
}

/// Distinct (report key, text, cleaned text) mentions; the first cleaned
/// text seen for a (key, text) pair wins.
pub(crate) fn distinct_mentions(
    table: &Table,
    column: &str,
    cleaned_column: Option<&str>,
) -> Result<BTreeMap<(ReportKey, String), Option<String>>> {
    let key = table.require_column(REPORT_KEY_COLUMN)?;
    let text = table.require_column(column)?;
    let cleaned = cleaned_column.and_then(|name| table.column_index(name));
    let mut mentions = BTreeMap::new();
    for row in &table.rows {
        let Some(report_key) = ReportKey::parse(&row[key]) else {
            continue;
        };
        if row[text].is_empty() {
            continue;
        }
        let cleaned_text = cleaned
            .map(|idx| row[idx].clone())
            .filter(|value| !value.is_empty());
        mentions
            .entry((report_key, row[text].clone()))
            .or_insert(cleaned_text);
    }
    Ok(mentions)
}

#[derive(Debug, Default, Serialize)]
struct Coverage {
    rxcui_rows: u64,
    rxcui_unmapped: u64,
    drug_mentions: u64,
    drug_mentions_unmapped: u64,
    drug_mentions_without_ingredient: u64,
    reaction_mentions: u64,
    reaction_mentions_unmapped: u64,
    reaction_terms_without_top_level: u64,
}

/// Loads the vocabulary and writes every standardized table.
pub fn standardize(ctx: &PipelineContext) -> Result<StageOutcome> {
    let store = ctx.load_vocabulary()?;
    standardize_with(ctx, &store)
}

/// Writes every standardized table using an already-loaded vocabulary.
pub fn standardize_with(ctx: &PipelineContext, store: &VocabularyStore) -> Result<StageOutcome> {
    let _span = info_span!("stage", stage = STAGE).entered();
    let start = Instant::now();
    let mut stats = StageStats::new(Stage::Standardize.as_str());
    let mut standardizer = Standardizer::new(store, &ctx.options.resolver)?;
    let mut coverage = Coverage::default();
    let levels = ctx.options.resolver.hierarchy_levels.clone();

    // RxCUI → RxNorm.
    let drugs_path = ctx.er_table("drugs");
    let drugs = ctx.read_output(
        STAGE,
        &drugs_path,
        ColumnContract::new([REPORT_KEY_COLUMN, "rxcui"]),
    )?;
    stats.record_input("drugs", drugs.len() as u64, Some(&drugs_path));
    let mut standard_drugs = Table::new(headers(&[
        REPORT_KEY_COLUMN,
        "rxcui",
        "RxNorm_concept_id",
        "RxNorm_concept_code",
        "RxNorm_concept_name",
        "RxNorm_concept_class_id",
    ]));
    let drug_key = drugs.require_column(REPORT_KEY_COLUMN)?;
    let rxcui = drugs.require_column("rxcui")?;
    let mut rxnorm_ids = BTreeSet::new();
    for row in &drugs.rows {
        coverage.rxcui_rows += 1;
        match standardizer.rxnorm_by_code(&row[rxcui]) {
            Some(concept) => {
                rxnorm_ids.insert(concept.concept_id);
                let mut out = vec![row[drug_key].clone(), row[rxcui].clone()];
                out.extend(concept_cells(concept));
                standard_drugs.push_row(out);
            }
            None => coverage.rxcui_unmapped += 1,
        }
    }
    standard_drugs.dedup_rows();

    // Free-text drug mentions.
    let characteristics_path = ctx.er_table("drugcharacteristics");
    let characteristics = ctx.read_output(
        STAGE,
        &characteristics_path,
        ColumnContract::new([REPORT_KEY_COLUMN, "medicinal_product"])
            .with_optional(["cleaned_product"]),
    )?;
    stats.record_input(
        "drugcharacteristics",
        characteristics.len() as u64,
        Some(&characteristics_path),
    );
    let drug_mentions =
        distinct_mentions(&characteristics, "medicinal_product", Some("cleaned_product"))?;
    let mut resolved_drugs = Table::new(DrugMention::headers());
    for ((report_key, product), cleaned) in drug_mentions {
        coverage.drug_mentions += 1;
        let mention = standardizer.drug_mention(report_key, &product, cleaned.as_deref());
        match mention.product_concept {
            Some(id) => {
                rxnorm_ids.insert(id);
                if !mention.is_resolved() {
                    coverage.drug_mentions_without_ingredient += 1;
                }
            }
            None => coverage.drug_mentions_unmapped += 1,
        }
        for row in mention.to_rows() {
            resolved_drugs.push_row(row);
        }
    }

    // Ingredients and their classification codes.
    let mut ingredient_table = Table::new(headers(&[
        "RxNorm_concept_id",
        "ingredient_concept_id",
        "ingredient_concept_code",
        "ingredient_concept_name",
        "hops",
    ]));
    let mut ingredient_ids = BTreeSet::new();
    for &drug in &rxnorm_ids {
        for hit in standardizer.ingredients(drug) {
            let Some(ingredient) = store.concept(hit.concept_id) else {
                continue;
            };
            ingredient_ids.insert(hit.concept_id);
            ingredient_table.push_row(vec![
                drug.to_string(),
                ingredient.concept_id.to_string(),
                ingredient.concept_code.clone(),
                ingredient.concept_name.clone(),
                hit.hops.to_string(),
            ]);
        }
    }
    let mut atc_table = Table::new(headers(&[
        "ingredient_concept_id",
        "ATC_concept_id",
        "ATC_concept_code",
        "ATC_concept_name",
    ]));
    for &ingredient in &ingredient_ids {
        for atc in standardizer.atc_concepts(ingredient) {
            atc_table.push_row(vec![
                ingredient.to_string(),
                atc.concept_id.to_string(),
                atc.concept_code.clone(),
                atc.concept_name.clone(),
            ]);
        }
    }

    // Reactions → preferred terms → top level.
    let reactions_path = ctx.er_table("reactions");
    let reactions = ctx.read_output(
        STAGE,
        &reactions_path,
        ColumnContract::new([REPORT_KEY_COLUMN, "reaction_meddrapt"]),
    )?;
    stats.record_input("reactions", reactions.len() as u64, Some(&reactions_path));
    let reaction_mentions = distinct_mentions(&reactions, "reaction_meddrapt", None)?;
    let mut standard_reactions = Table::new(headers(&[
        REPORT_KEY_COLUMN,
        "reaction_meddrapt",
        "MedDRA_concept_id",
        "MedDRA_concept_code",
        "MedDRA_concept_name",
        "MedDRA_concept_class_id",
    ]));
    let mut resolved_reactions = Table::new(ReactionMention::headers());
    let mut term_ids = BTreeSet::new();
    for (report_key, reaction) in reaction_mentions.into_keys() {
        coverage.reaction_mentions += 1;
        let Some(term) = standardizer.preferred_term(&reaction) else {
            coverage.reaction_mentions_unmapped += 1;
            continue;
        };
        term_ids.insert(term.concept_id);
        let mut out = vec![report_key.to_string(), reaction.clone()];
        out.extend(concept_cells(term));
        standard_reactions.push_row(out);
        if let Some(row) = standardizer.reaction_mention(report_key, &reaction).to_row() {
            resolved_reactions.push_row(row);
        }
    }

    let mut level_headers: Vec<String> = levels
        .iter()
        .map(|level| level_column(level, "concept_id"))
        .collect();
    let top = levels.last().map_or(concept_class::SOC, String::as_str);
    level_headers.push(level_column(top, "concept_code"));
    level_headers.push(level_column(top, "concept_name"));
    level_headers.push("hops".to_string());
    let mut hierarchy_table = Table::new(level_headers);
    let mut snomed_table = Table::new(headers(&[
        "MedDRA_concept_id",
        "SNOMED_concept_id",
        "SNOMED_concept_code",
        "SNOMED_concept_name",
    ]));
    for &term in &term_ids {
        match standardizer.top_level_path(term) {
            Some(path) => {
                let mut row: Vec<String> = path
                    .levels
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                let (code, name) = store
                    .concept(path.top_level)
                    .map(|c| (c.concept_code.clone(), c.concept_name.clone()))
                    .unwrap_or_default();
                row.extend([code, name, path.hops.to_string()]);
                hierarchy_table.push_row(row);
            }
            None => coverage.reaction_terms_without_top_level += 1,
        }
        for snomed in standardizer.snomed_concepts(term) {
            snomed_table.push_row(vec![
                term.to_string(),
                snomed.concept_id.to_string(),
                snomed.concept_code.clone(),
                snomed.concept_name.clone(),
            ]);
        }
    }

    let dir = ctx.standard_dir();
    let hierarchy_key = hierarchy_table.headers[0].clone();
    let outputs = [
        ("standard_drugs", &standard_drugs, REPORT_KEY_COLUMN),
        ("standard_drugs_rxnorm_ingredients", &ingredient_table, "RxNorm_concept_id"),
        ("standard_drugs_atc", &atc_table, "ingredient_concept_id"),
        ("standard_reactions", &standard_reactions, REPORT_KEY_COLUMN),
        ("standard_reactions_meddra_hierarchy", &hierarchy_table, hierarchy_key.as_str()),
        ("standard_reactions_snomed", &snomed_table, "MedDRA_concept_id"),
        ("drug_mentions_resolved", &resolved_drugs, REPORT_KEY_COLUMN),
        ("reaction_mentions_resolved", &resolved_reactions, REPORT_KEY_COLUMN),
    ];
    for (name, table, key) in outputs {
        write_output(&mut stats, name, &ctx.standard_table(name), table, &[key])?;
    }

    let rxnorm_snapshot = write_snapshot(&dir.join(RXNORM_SNAPSHOT), vocabulary::RXNORM, &rxnorm_ids)?;
    let meddra_snapshot = write_snapshot(&dir.join(MEDDRA_SNAPSHOT), vocabulary::MEDDRA, &term_ids)?;

    stats.record_unique("ingredients", &resolved_drugs, "ingredient_concept_id");
    stats.record_unique("preferred_terms", &resolved_reactions, "pt_concept_id");
    stats.merge_rejected(store.rejected(), ctx.options.engine.rejected_sample_size);
    stats.insert_extra("coverage", &coverage);
    stats.insert_extra("vocabulary", store.stats());
    stats.insert_extra("mapper_collisions", standardizer.collisions());
    stats.insert_extra(
        "snapshots",
        BTreeMap::from([
            ("rxnorm", rxnorm_snapshot.len()),
            ("meddra", meddra_snapshot.len()),
        ]),
    );
    info!(
        drug_mentions = coverage.drug_mentions,
        drug_mentions_unmapped = coverage.drug_mentions_unmapped,
        reaction_mentions = coverage.reaction_mentions,
        reaction_mentions_unmapped = coverage.reaction_mentions_unmapped,
        duration_ms = start.elapsed().as_millis(),
        "standardized mentions"
    );
    StageOutcome::finish(ctx, Stage::Standardize, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aer_model::Relationship;

    fn store() -> VocabularyStore {
        VocabularyStore::from_parts(
            vec![
                Concept::new(1, "243670", "Aspirin 81mg", "Clinical Drug", "RxNorm"),
                Concept::new(2, "1191", "Aspirin", "Ingredient", "RxNorm"),
                Concept::new(5, "N02BA01", "acetylsalicylic acid", "ATC 5th", "ATC"),
                Concept::new(10, "10019211", "Headache", "PT", "MedDRA"),
                Concept::new(11, "10019233", "Headaches NEC", "HLT", "MedDRA"),
                Concept::new(12, "10019231", "Headaches", "HLGT", "MedDRA"),
                Concept::new(13, "10029205", "Nervous system disorders", "SOC", "MedDRA"),
            ],
            vec![
                Relationship::new(1, 2, "RxNorm has ing"),
                Relationship::new(2, 5, "Maps to"),
                Relationship::new(10, 11, "Is a"),
                Relationship::new(11, 12, "Is a"),
                Relationship::new(12, 13, "Is a"),
            ],
        )
    }

    fn key(raw: &str) -> ReportKey {
        ReportKey::parse(raw).unwrap()
    }

    #[test]
    fn drug_mention_resolves_to_ingredient_and_atc() {
        let store = store();
        let mut standardizer = Standardizer::new(&store, &ResolverOptions::default()).unwrap();
        let mention = standardizer.drug_mention(key("R1"), "ASPIRIN  81MG", None);
        assert_eq!(mention.product_concept, Some(1));
        assert_eq!(mention.ingredients.len(), 1);
        assert_eq!(mention.ingredients[0].concept_id, 2);
        assert_eq!(mention.ingredients[0].classification_codes, vec!["N02BA01"]);
    }

    #[test]
    fn cleaned_text_is_preferred_and_ingredients_map_to_themselves() {
        let store = store();
        let mut standardizer = Standardizer::new(&store, &ResolverOptions::default()).unwrap();
        let mention = standardizer.drug_mention(key("R1"), "BAYER BACK & BODY", Some("aspirin"));
        assert_eq!(mention.product, "BAYER BACK & BODY");
        assert_eq!(mention.product_concept, Some(2));
        assert_eq!(
            standardizer.ingredients(2),
            vec![IngredientHit {
                concept_id: 2,
                hops: 0
            }]
        );
    }

    #[test]
    fn reaction_mention_reaches_top_level() {
        let store = store();
        let mut standardizer = Standardizer::new(&store, &ResolverOptions::default()).unwrap();
        let mention = standardizer.reaction_mention(key("R1"), "headache");
        assert_eq!(mention.term_concept, Some(10));
        assert_eq!(mention.top_level.as_ref().map(|top| top.concept_id), Some(13));

        let unknown = standardizer.reaction_mention(key("R1"), "Unobtainium poisoning");
        assert!(unknown.to_row().is_none());
    }

    #[test]
    fn level_columns_are_lowercase() {
        assert_eq!(level_column("HLGT", "concept_id"), "hlgt_concept_id");
        assert_eq!(level_column("ATC 5th", "code"), "atc_5th_code");
    }
}
