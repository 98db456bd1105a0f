use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use ruleforge::dictionary::TokenDictionary;
use ruleforge::error::GrammarResult;
use ruleforge::grammar::{Grammar, OutputFormat};
use ruleforge::sampler::EpochReport;

const TOP_RULES: usize = 10;
const HISTOGRAM_ROWS: usize = 8;

fn right_align(table: &mut Table, from: usize, to: usize) {
    for i in from..=to {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
}

pub fn print_epoch_report(report: &EpochReport) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![
        Cell::new("Epoch").add_attribute(Attribute::Bold),
        Cell::new("LogLik").fg(Color::Cyan),
        Cell::new("Rules"),
        Cell::new("Tokens"),
        Cell::new("Interior"),
        Cell::new("Spans").fg(Color::Green),
        Cell::new("Swaps").fg(Color::Green),
        Cell::new("Sync s"),
        Cell::new("Epoch s"),
    ]);
    right_align(&mut table, 1, 8);

    let m = &report.moves;
    table.add_row(vec![
        Cell::new(report.epoch).add_attribute(Attribute::Bold),
        Cell::new(format!("{:.3}", report.grammar.log_likelihood)).fg(Color::Cyan),
        Cell::new(report.grammar.grammar_size),
        Cell::new(report.grammar.total_rules),
        Cell::new(format!("{:.2}", report.grammar.mean_interior_nodes)),
        Cell::new(format!("{}/{}", m.span_changes, m.span_moves)),
        Cell::new(format!("{}/{}", m.swaps_accepted, m.swap_moves)),
        Cell::new(format!("{:.3}", report.sync_seconds)),
        Cell::new(format!("{:.2}", report.epoch_seconds)),
    ]);
    println!("{}", table);
}

/// The smallest counts are where the mass of distinct rules sits.
pub fn print_histogram(report: &EpochReport) {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.set_header(vec!["Count", "Rules"]);
    right_align(&mut table, 0, 1);

    let histogram = &report.grammar.histogram;
    for (count, rules) in histogram.iter().take(HISTOGRAM_ROWS) {
        table.add_row(vec![Cell::new(count), Cell::new(rules)]);
    }
    if histogram.len() > HISTOGRAM_ROWS {
        let rest: usize = histogram.values().skip(HISTOGRAM_ROWS).sum();
        table.add_row(vec![Cell::new("more"), Cell::new(rest)]);
    }
    println!("{}", table);
}

pub fn print_top_rules(grammar: &Grammar, dict: &TokenDictionary) -> GrammarResult<()> {
    let mut entries: Vec<_> = grammar.iter().collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));

    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Rule").add_attribute(Attribute::Bold),
        Cell::new("Count"),
        Cell::new("P(rule|tag)"),
    ]);
    right_align(&mut table, 1, 2);

    for entry in entries.into_iter().take(TOP_RULES) {
        table.add_row(vec![
            Cell::new(entry.rule.to_stsg(dict)?),
            Cell::new(entry.count),
            Cell::new(format!("{:.4}", entry.probability)),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn print_grammar_summary(grammar: &Grammar, format: OutputFormat, fingerprint: &str) {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.add_row(vec![Cell::new("Rules"), Cell::new(grammar.len())]);
    table.add_row(vec![Cell::new("Format"), Cell::new(format)]);
    table.add_row(vec![Cell::new("SHA-256"), Cell::new(fingerprint)]);
    println!("{}", table);
}
