// Colored terminal output for the `classify` command.

use colored::Colorize;

use super::truncate_chars;
use crate::toxicity::labels::{join_labels, ClassificationResult};

/// Display per-label scores for one text, marking labels above `threshold`.
pub fn display_classification(text: &str, result: &ClassificationResult, threshold: f64) {
    println!("\n{}", format!("\"{}\"", truncate_chars(text, 80)).dimmed());
    println!();

    println!(
        "  {:<14} {:>6}  {}",
        "Label".dimmed(),
        "Score".dimmed(),
        "Bar".dimmed()
    );
    println!("  {}", "-".repeat(44).dimmed());

    for (label, score) in result.iter() {
        let bar = score_bar(score, 20);
        if score > threshold {
            println!(
                "  {:<14} {:>6.3}  {}",
                label.as_str().red().bold(),
                score,
                bar.red()
            );
        } else {
            println!("  {:<14} {:>6.3}  {}", label.as_str(), score, bar.dimmed());
        }
    }

    println!();

    let triggered = result.triggered(threshold);
    if triggered.is_empty() {
        println!("  {} (threshold {threshold})", "Clean".green().bold());
    } else {
        println!(
            "  {} {} (threshold {threshold})",
            "Flagged:".red().bold(),
            join_labels(&triggered)
        );
    }
}

/// Fixed-width bar: `score` of `width` cells filled.
fn score_bar(score: f64, width: usize) -> String {
    let filled = ((score.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bar_bounds() {
        assert_eq!(score_bar(0.0, 4), "....");
        assert_eq!(score_bar(1.0, 4), "####");
        assert_eq!(score_bar(0.5, 4), "##..");
    }
}
