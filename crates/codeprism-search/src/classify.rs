//! Repository classification of a query embedding.

use codeprism_core::Card;
use codeprism_embeddings::cosine_similarity;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct RepoClassification {
    pub repository: String,
    /// Gap between the best and second-best centroid similarity; 1.0 when
    /// only one repository is known.
    pub confidence: f32,
}

/// Mean card embedding per source repository.
#[derive(Debug, Clone, Default)]
pub struct RepoCentroids {
    centroids: Vec<(String, Vec<f32>)>,
}

impl RepoCentroids {
    pub fn from_cards(cards: &[Card], embeddings: &HashMap<String, Vec<f32>>) -> Self {
        let mut sums: BTreeMap<&str, (Vec<f32>, usize)> = BTreeMap::new();
        for card in cards {
            let Some(embedding) = embeddings.get(&card.id) else {
                continue;
            };
            for repo in &card.source_repos {
                let (sum, n) = sums
                    .entry(repo.as_str())
                    .or_insert_with(|| (vec![0.0; embedding.len()], 0));
                if sum.len() != embedding.len() {
                    continue;
                }
                sum.iter_mut().zip(embedding).for_each(|(s, v)| *s += v);
                *n += 1;
            }
        }
        let centroids = sums
            .into_iter()
            .filter(|(_, (_, n))| *n > 0)
            .map(|(repo, (sum, n))| (repo.to_string(), sum.into_iter().map(|s| s / n as f32).collect()))
            .collect();
        Self { centroids }
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn classify(&self, query: &[f32]) -> Option<RepoClassification> {
        let mut scored: Vec<(&str, f32)> = self
            .centroids
            .iter()
            .map(|(repo, c)| (repo.as_str(), cosine_similarity(query, c)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let (best, best_score) = *scored.first()?;
        let confidence = match scored.get(1) {
            Some((_, second)) => best_score - second,
            None => 1.0,
        };
        Some(RepoClassification {
            repository: best.to_string(),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeprism_core::CardType;

    fn card(id: &str, repo: &str) -> Card {
        let mut c = Card::new(id, "f", id, "x", CardType::Flow);
        c.source_repos = vec![repo.into()];
        c
    }

    #[test]
    fn confidence_is_the_similarity_gap() {
        let cards = vec![card("a", "backend"), card("b", "backend"), card("c", "web")];
        let embeddings: HashMap<String, Vec<f32>> = [
            ("a".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), vec![1.0, 0.2]),
            ("c".to_string(), vec![0.0, 1.0]),
        ]
        .into_iter()
        .collect();
        let centroids = RepoCentroids::from_cards(&cards, &embeddings);
        assert_eq!(centroids.len(), 2);

        let hit = centroids.classify(&[1.0, 0.1]).unwrap();
        assert_eq!(hit.repository, "backend");
        assert!(hit.confidence > 0.5);

        let tie = centroids.classify(&[1.0, 1.1]).unwrap();
        assert!(tie.confidence < 0.1);
    }

    #[test]
    fn single_repository_is_fully_confident() {
        let cards = vec![card("a", "backend")];
        let embeddings: HashMap<String, Vec<f32>> = [("a".to_string(), vec![0.3, 0.4])].into_iter().collect();
        let hit = RepoCentroids::from_cards(&cards, &embeddings).classify(&[0.0, 1.0]).unwrap();
        assert_eq!(hit.confidence, 1.0);
        assert!(RepoCentroids::default().classify(&[1.0]).is_none());
    }
}
