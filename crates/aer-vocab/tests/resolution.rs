use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use aer_ingest::IngestError;
use aer_model::CoercionPolicy;
use aer_vocab::{
    ClassificationMapper, ConceptMapper, HierarchyResolver, IngredientResolver, LoadOptions,
    VocabError, VocabularyStore,
};

const CONCEPTS: &str = "\
concept_id\tconcept_name\tdomain_id\tvocabulary_id\tconcept_class_id\tstandard_concept\tconcept_code
1\tAspirin 81mg\tDrug\tRxNorm\tClinical Drug\tS\t243670
2\tAspirin\tDrug\tRxNorm\tIngredient\tS\t1191
3\tAcetaminophen / Aspirin Oral Tablet\tDrug\tRxNorm\tClinical Drug Comp\tS\t1001
4\tAcetaminophen\tDrug\tRxNorm\tIngredient\tS\t161
5\tacetylsalicylic acid\tDrug\tATC\tATC 5th\tC\tN02BA01
10\tHeadache\tCondition\tMedDRA\tPT\tC\t10019211
11\tHeadaches NEC\tCondition\tMedDRA\tHLT\tC\t10019233
12\tHeadaches\tCondition\tMedDRA\tHLGT\tC\t10019231
13\tNervous system disorders\tCondition\tMedDRA\tSOC\tC\t10029205
14\tGeneral disorders\tCondition\tMedDRA\tSOC\tC\t10018065
20\tMigraine\tCondition\tMedDRA\tPT\tC\t10027599
21\tMigraine headaches\tCondition\tMedDRA\tHLT\tC\t10027603
22\tHeadaches and migraines\tCondition\tMedDRA\tHLGT\tC\t10019232
40\tMalaise\tCondition\tMedDRA\tPT\tC\t10025482
30\tHeadache\tCondition\tSNOMED\tClinical Finding\tS\t25064002
";

const RELATIONSHIPS: &str = "\
concept_id_1,concept_id_2,relationship_id,valid_start_date
1,2,RxNorm has ing,19700101
1,2,RxNorm has ing,19700101
2,2,Maps to,19700101
3,1,Contains,19700101
3,4,RxNorm has ing,19700101
2,5,RxNorm - ATC,19700101
10,11,Is a,19700101
11,12,Is a,19700101
12,13,Is a,19700101
10,30,MedDRA - SNOMED eq,19700101
20,21,Is a,19700101
21,12,Is a,19700101
21,14,Is a,19700101
21,22,Is a,19700101
22,14,Is a,19700101
40,14,Is a,19700101
";

fn write_gz(path: &Path, contents: &str) {
    let file = std::fs::File::create(path).expect("create");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).expect("write");
    encoder.finish().expect("finish");
}

/// Concept table plain and tab-separated, relationships gzipped in a subdirectory.
fn fixture(concepts: &str) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("CONCEPT.csv"), concepts).expect("write concepts");
    let nested = dir.path().join("vocabulary_download_v5");
    std::fs::create_dir(&nested).expect("mkdir");
    write_gz(&nested.join("CONCEPT_RELATIONSHIP.csv.gz"), RELATIONSHIPS);
    dir
}

#[test]
fn resolves_aspirin_and_headache() {
    let dir = fixture(CONCEPTS);
    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");

    let ingredients = IngredientResolver::new(&store, 6);
    assert_eq!(ingredients.ingredients(1), BTreeSet::from([2]));

    let hierarchy = HierarchyResolver::meddra(&store, 4);
    let path = hierarchy.resolve_one(10).expect("headache resolves");
    assert_eq!(path.top_level, 13);
    assert_eq!(path.hops, 3);
    assert_eq!(path.levels, vec![10, 11, 12, 13]);
}

#[test]
fn duplicate_edges_and_self_loops_do_not_leak_into_results() {
    let dir = fixture(CONCEPTS);
    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
    assert_eq!(store.stats().duplicate_edges, 1);
    assert_eq!(store.stats().self_loops, 1);

    let resolver = IngredientResolver::new(&store, 6);
    let hits = resolver.resolve_one(1);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, vec![1, 2]);
    // Ingredients resolve to nothing: same class as origin.
    assert!(resolver.ingredients(2).is_empty());
}

#[test]
fn composite_product_flattens_to_all_ingredients() {
    let dir = fixture(CONCEPTS);
    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
    let resolver = IngredientResolver::new(&store, 6);
    assert_eq!(resolver.ingredients(3), BTreeSet::from([2, 4]));

    let bounded = IngredientResolver::new(&store, 1);
    assert_eq!(bounded.ingredients(3), BTreeSet::from([4]));
}

#[test]
fn equal_length_hierarchy_paths_pick_lowest_top_level() {
    let dir = fixture(CONCEPTS);
    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
    let path = HierarchyResolver::meddra(&store, 4)
        .resolve_one(20)
        .expect("migraine resolves");
    // 20 -> 21 -> 12 -> 13 and 20 -> 21 -> 22 -> 14; the HLT -> SOC shortcut is not a path.
    assert_eq!(path.top_level, 13);
    assert_eq!(path.hops, 3);
    assert_eq!(path.levels, vec![20, 21, 12, 13]);
}

#[test]
fn term_linked_straight_to_top_level_is_unresolved() {
    let dir = fixture(CONCEPTS);
    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
    assert!(HierarchyResolver::meddra(&store, 4).resolve_one(40).is_none());
}

#[test]
fn hop_bound_leaves_term_unresolved() {
    let dir = fixture(CONCEPTS);
    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
    assert!(HierarchyResolver::meddra(&store, 2).resolve_one(10).is_none());
}

#[test]
fn resolution_is_deterministic_across_loads() {
    let dir = fixture(CONCEPTS);
    let products = BTreeSet::from([1, 2, 3, 4, 99]);
    let terms = BTreeSet::from([10, 20, 11]);
    let run = || {
        let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
        let ingredients = IngredientResolver::new(&store, 6).resolve(&products);
        let hierarchy = HierarchyResolver::meddra(&store, 4).resolve(&terms);
        (ingredients, hierarchy)
    };
    let (first_ing, first_hier) = run();
    let (second_ing, second_hier) = run();
    assert_eq!(first_ing, second_ing);
    assert_eq!(first_hier, second_hier);
    assert_eq!(first_ing.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(first_hier.keys().copied().collect::<Vec<_>>(), vec![10, 20]);
}

#[test]
fn mappers_work_on_loaded_store() {
    let dir = fixture(CONCEPTS);
    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
    let rxnorm = ConceptMapper::new(&store, "RxNorm", None);
    assert_eq!(rxnorm.map_code("243670").map(|c| c.concept_id), Some(1));
    assert_eq!(rxnorm.map_name("aspirin  81MG").map(|c| c.concept_id), Some(1));

    let atc = ClassificationMapper::new(&store, "ATC", Some("ATC 5th"));
    assert_eq!(atc.codes(2), vec!["N02BA01"]);

    let snomed = ClassificationMapper::new(&store, "SNOMED", None).via("MedDRA - SNOMED eq");
    assert_eq!(snomed.codes(10), vec!["25064002"]);
    assert!(store.concept(1).is_some_and(|c| c.is_standard()));
}

#[test]
fn missing_relationship_table_is_fatal() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("CONCEPT.csv"), CONCEPTS).expect("write");
    let err = VocabularyStore::load(dir.path(), &LoadOptions::default()).unwrap_err();
    match err {
        VocabError::MissingTable { table, .. } => assert_eq!(table, "CONCEPT_RELATIONSHIP.csv"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_required_column_names_file_and_column() {
    let without_class = "concept_id\tconcept_name\tvocabulary_id\tconcept_code\n1\tAspirin\tRxNorm\t1191\n";
    let dir = fixture(without_class);
    let err = VocabularyStore::load(dir.path(), &LoadOptions::default()).unwrap_err();
    match err {
        VocabError::Ingest(IngestError::MissingColumn { column, path }) => {
            assert_eq!(column, "concept_class_id");
            assert!(path.ends_with("CONCEPT.csv"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn coercion_policy_drops_or_fails() {
    let mut concepts = CONCEPTS.to_string();
    concepts.push_str("abc\tBroken\tDrug\tRxNorm\tIngredient\tS\t999\n");
    let dir = fixture(&concepts);

    let store = VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load");
    assert_eq!(store.len(), 15);
    let rejected = store.rejected().get("concept.concept_id").expect("ledger entry");
    assert_eq!(rejected.count, 1);
    assert_eq!(rejected.sample, vec!["abc"]);

    let strict = LoadOptions {
        coercion: CoercionPolicy::Fail,
        ..LoadOptions::default()
    };
    let err = VocabularyStore::load(dir.path(), &strict).unwrap_err();
    assert!(matches!(
        err,
        VocabError::Ingest(IngestError::InvalidValue { ref value, .. }) if value == "abc"
    ));
}

const RETIRED_CONCEPTS: &str = "\
concept_id\tconcept_name\tdomain_id\tvocabulary_id\tconcept_class_id\tstandard_concept\tconcept_code
2\tAspirin\tDrug\tRxNorm\tIngredient\tS\t1191
50\tAspirin Oral Tablet\tDrug\tRxNorm\tClinical Drug\tS\t318272
51\tAspirin Tablet (retired)\tDrug\tRxNorm\tClinical Drug\t\t198466
52\tSalicylate\tDrug\tRxNorm\tIngredient\t\t9525
\tOrphan row\tDrug\tRxNorm\tIngredient\tS\t0
";

const RETIRED_RELATIONSHIPS: &str = "\
concept_id_1,concept_id_2,relationship_id
50,51,Mapped from
51,2,RxNorm has ing
50,52,RxNorm has ing
";

fn retired_store(concepts: &str) -> VocabularyStore {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("CONCEPT.csv"), concepts).expect("write concepts");
    std::fs::write(dir.path().join("CONCEPT_RELATIONSHIP.csv"), RETIRED_RELATIONSHIPS)
        .expect("write relationships");
    VocabularyStore::load(dir.path(), &LoadOptions::default()).expect("load")
}

#[test]
fn non_standard_concepts_are_skipped_by_default() {
    let store = retired_store(RETIRED_CONCEPTS);
    assert!(store.has_standard_flags());

    let resolver = IngredientResolver::new(&store, 6);
    assert!(resolver.ingredients(50).is_empty());

    let permissive = IngredientResolver::new(&store, 6).standard_only(false);
    assert_eq!(permissive.ingredients(50), BTreeSet::from([2, 52]));
}

#[test]
fn concept_table_without_flags_keeps_every_concept_eligible() {
    let unflagged: String = RETIRED_CONCEPTS
        .lines()
        .map(|line| {
            let mut cells: Vec<&str> = line.split('\t').collect();
            cells.remove(5);
            cells.join("\t") + "\n"
        })
        .collect();
    let store = retired_store(&unflagged);
    assert!(!store.has_standard_flags());

    let resolver = IngredientResolver::new(&store, 6).standard_only(true);
    assert_eq!(resolver.ingredients(50), BTreeSet::from([2, 52]));
}

#[test]
fn blank_concept_ids_are_counted() {
    let store = retired_store(RETIRED_CONCEPTS);
    assert_eq!(store.len(), 4);
    assert_eq!(store.stats().blank_concept_ids, 1);
    assert!(store.rejected().is_empty());
}
