//! Vertical card display for classification outcomes, duty and taxonomy nodes.

use tariffa_core::{ClassificationResult, DutyRate, NarrowingQuestion, TaxonomyNode};
use tariffa_engine::ClassifyOutcome;

const MAX_LIST_ITEMS: usize = 10;

pub fn print_outcome(outcome: &ClassifyOutcome) {
    match outcome {
        ClassifyOutcome::Classified(result) => print_result_card(result),
        ClassifyOutcome::NeedsInput {
            questions,
            best_so_far,
        } => {
            print_result_card(best_so_far);
            print_questions(questions);
        }
        ClassifyOutcome::NoMatch { message } => println!("{message}"),
    }
}

pub fn print_result_card(result: &ClassificationResult) {
    println!("=== {} ===", result.formatted_code);
    println!("{}", result.description);
    println!();

    // ── Classification ──
    println!("Classification");
    println!("  {:<22} {}", "status", result.status.as_str());
    println!("  {:<22} {:.1}%", "confidence", result.confidence * 100.0);
    let path: Vec<&str> = result
        .hierarchy_path
        .iter()
        .map(|n| n.formatted_code.as_str())
        .collect();
    println!("  {:<22} {}", "path", path.join(" > "));
    println!();

    if let Some(duty) = &result.duty_rate {
        print_duty_section(duty);
    }

    if !result.alternatives.is_empty() {
        println!("Alternatives");
        for alt in &result.alternatives {
            println!(
                "  {:<22} {:>5.1}%  {}",
                alt.formatted_code,
                alt.confidence * 100.0,
                truncate(&alt.description, 60)
            );
        }
        println!();
    }

    if !result.warnings.is_empty() {
        println!("Warnings");
        for w in &result.warnings {
            println!("  ! {w}");
        }
        println!();
    }

    if !result.rationale.is_empty() {
        println!("Rationale");
        for line in result.rationale.lines() {
            println!("  {line}");
        }
        println!();
    }
}

pub fn print_questions(questions: &[NarrowingQuestion]) {
    println!("Questions ({})", questions.len());
    for q in questions {
        println!("  {}. {}", q.priority, q.question_text);
        if q.options.is_empty() {
            println!("       (free text)");
        }
        for (i, option) in q.options.iter().enumerate() {
            println!("       {}) {}", i + 1, option);
        }
    }
    println!();
}

pub fn print_duty_card(duty: &DutyRate) {
    println!("=== Duty {} ===", tariffa_core::format_code(&duty.code));
    println!();
    print_duty_section(duty);
}

fn print_duty_section(duty: &DutyRate) {
    println!("Duty");
    println!("  {:<22} {}", "origin", duty.origin.as_deref().unwrap_or("-"));
    let source = match (&duty.rate_source.code, duty.rate_source.inherited) {
        (Some(code), true) => format!(" (from {})", tariffa_core::format_code(code)),
        (None, _) => " (default)".to_string(),
        _ => String::new(),
    };
    println!("  {:<22} {}{}", "general rate", duty.general_rate, source);
    for p in &duty.additional_programs {
        println!("  {:<22} +{}", p.program, p.rate);
    }
    println!("  {:<22} {}", "effective rate", duty.effective_display());

    if !duty.conditional_programs.is_empty() {
        println!("  conditional:");
        for p in &duty.conditional_programs {
            let note = p.note.as_deref().unwrap_or("");
            println!("    {:<20} +{}  {}", p.program, p.rate, note);
        }
    }
    if !duty.special_programs.is_empty() {
        let programs: Vec<String> = duty
            .special_programs
            .iter()
            .map(|s| format!("{} {}", s.program, s.rate))
            .collect();
        println!("  {:<22} {}", "special", programs.join(", "));
    }
    for note in &duty.notes {
        println!("  - {note}");
    }
    println!();
}

pub fn print_node_card(node: &TaxonomyNode, path: &[TaxonomyNode], children: &[TaxonomyNode]) {
    println!("=== {} ===", node.formatted_code);
    println!("{}", node.description);
    println!();

    println!("Node");
    println!("  {:<22} {}", "level", node.level);
    if let Some(rate) = &node.base_rate {
        println!("  {:<22} {}", "general rate", rate);
    }
    if let Some(rate) = &node.special_rate {
        println!("  {:<22} {}", "special rate", rate);
    }
    println!();

    if path.len() > 1 {
        println!("Path");
        for (depth, n) in path.iter().enumerate() {
            println!(
                "  {:indent$}{}  {}",
                "",
                n.formatted_code,
                truncate(&n.description, 60),
                indent = depth * 2
            );
        }
        println!();
    }

    if !children.is_empty() {
        println!("Children ({})", children.len());
        print_rows(children);
        println!();
    }
}

pub fn print_node_list(nodes: &[TaxonomyNode]) {
    println!("{} matches", nodes.len());
    for n in nodes {
        println!("  {:<16} {}", n.formatted_code, truncate(&n.description, 70));
    }
}

fn print_rows(nodes: &[TaxonomyNode]) {
    for n in nodes.iter().take(MAX_LIST_ITEMS) {
        println!("  {:<16} {}", n.formatted_code, truncate(&n.description, 70));
    }
    if nodes.len() > MAX_LIST_ITEMS {
        println!("    ... and {} more", nodes.len() - MAX_LIST_ITEMS);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 3).collect();
        format!("{cut}...")
    }
}
