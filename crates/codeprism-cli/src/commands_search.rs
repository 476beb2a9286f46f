//! Search & stats commands.

use codeprism_sync::Codeprism;

pub(crate) fn cmd_search(cp: &Codeprism, query: &str, limit: Option<usize>, branch: Option<&str>) -> anyhow::Result<()> {
    let search = cp.search();
    let limit = limit.unwrap_or_else(|| search.default_limit());
    let hits = search.search(query, branch, limit)?;

    if hits.is_empty() {
        println!("No cards found for \"{query}\".");
        return Ok(());
    }

    println!("Top {} results for: \"{}\"\n", hits.len(), query);
    for hit in &hits {
        let card = &hit.card;
        println!("  [{:.3}] [{}] {} ({}, {})", hit.score, card.card_type, card.title, card.flow, hit.source);
        println!("         {}", crate::truncate_str(card.content.trim(), 120));
        if !card.source_files.is_empty() {
            println!("         files: {}", card.source_files.join(", "));
        }
        println!();
    }
    Ok(())
}

pub(crate) fn cmd_stats(cp: &Codeprism) -> anyhow::Result<()> {
    let health = cp.health()?;
    let stats = &health.stats;

    println!("codeprism statistics");
    println!("  Cards:        {} ({} stale)", stats.cards, stats.stale_cards);
    println!("  Flows:        {}", stats.flows);
    println!("  Files:        {}", stats.files);
    println!("  Graph edges:  {}", stats.edges);
    println!("  Vectors:      {}", health.vectors);
    println!("  Reindex:      {}", health.reindex.state);

    let embedding = &cp.config().embedding;
    if embedding.provider == "none" {
        println!("  Embedding provider: not configured");
    } else {
        println!("  Embedding provider: {} ({}, {}d)", embedding.provider, embedding.model, embedding.dimensions);
    }
    Ok(())
}
