use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use aer_core::{ConceptExplanation, StageOutcome};
use aer_vocab::VocabularyStore;

pub fn print_outcome(outcome: &StageOutcome) {
    let stats = &outcome.stats;
    println!("Stage: {}", outcome.stage);
    println!("Stats: {}", outcome.stats_path.display());
    if let Some(join_type) = stats.join_type {
        println!("Join type: {}", join_type.as_str());
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Rows"),
        header_cell("Columns"),
        header_cell("Nulls"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Right);
    let mut total_rows = 0u64;
    for (name, output) in &stats.outputs {
        let nulls: Option<u64> = stats
            .null_counts
            .get(name)
            .map(|counts| counts.values().sum());
        total_rows += output.rows;
        table.add_row(vec![
            Cell::new(name).fg(Color::Blue).add_attribute(Attribute::Bold),
            Cell::new(output.rows),
            Cell::new(output.columns.len()),
            count_cell(nulls, Color::Yellow),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(total_rows).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
    ]);
    println!("{table}");
    print_rejected_table(outcome);
}

fn print_rejected_table(outcome: &StageOutcome) {
    let rejected = &outcome.stats.rejected;
    if rejected.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Rejected column"),
        header_cell("Count"),
        header_cell("Sample"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for (scope, rows) in rejected.iter() {
        table.add_row(vec![
            Cell::new(scope),
            count_cell(Some(rows.count), Color::Red),
            Cell::new(rows.sample.join(", ")),
        ]);
    }
    println!("{table}");
}

pub fn print_explanations(store: &VocabularyStore, explanations: &[ConceptExplanation]) {
    for explanation in explanations {
        let concept = &explanation.concept;
        println!(
            "{} {} [{} / {}]",
            concept.concept_id, concept.concept_name, concept.vocabulary_id, concept.concept_class_id
        );
        let mut table = Table::new();
        table.set_header(vec![
            header_cell("Resolution"),
            header_cell("Concept"),
            header_cell("Name"),
            header_cell("Hops"),
        ]);
        apply_table_style(&mut table);
        align_column(&mut table, 3, CellAlignment::Right);
        for hit in &explanation.ingredients {
            table.add_row(vec![
                Cell::new("ingredient"),
                Cell::new(hit.concept_id),
                name_cell(store, hit.concept_id),
                Cell::new(hit.hops),
            ]);
        }
        for code in &explanation.atc_codes {
            table.add_row(vec![
                Cell::new("atc"),
                Cell::new(code),
                dim_cell("-"),
                dim_cell("-"),
            ]);
        }
        if let Some(path) = &explanation.hierarchy {
            table.add_row(vec![
                Cell::new("top level"),
                Cell::new(path.top_level),
                name_cell(store, path.top_level),
                Cell::new(path.hops),
            ]);
        }
        for id in &explanation.snomed {
            table.add_row(vec![
                Cell::new("snomed"),
                Cell::new(id),
                name_cell(store, *id),
                dim_cell("-"),
            ]);
        }
        if table.row_count() == 0 {
            println!("  no resolutions");
        } else {
            println!("{table}");
        }
    }
}

fn name_cell(store: &VocabularyStore, id: i64) -> Cell {
    match store.concept(id) {
        Some(concept) => Cell::new(&concept.concept_name),
        None => dim_cell("-"),
    }
}

fn count_cell(count: Option<u64>, color: Color) -> Cell {
    match count {
        Some(value) if value > 0 => Cell::new(value).fg(color).add_attribute(Attribute::Bold),
        Some(value) => dim_cell(value),
        None => dim_cell("-"),
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
