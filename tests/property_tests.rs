//! Property tests for ranking, confidence and token accounting

use chrono::Utc;
use lexflow::knowledge::similarity::rank;
use lexflow::knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use lexflow::rag::confidence_from_distance;
use lexflow::store::{ConversationStore, InMemoryConversationStore};
use lexflow::types::{KnowledgeEntry, NewConversation, NewKnowledgeEntry, NewMessage, SearchFilter};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

const DIMS: usize = 4;

fn to_vector(raw: &[i8]) -> Vec<f32> {
    (0..DIMS)
        .map(|i| raw.get(i).copied().unwrap_or(0) as f32 / 16.0)
        .collect()
}

fn entries(raw: &[Vec<i8>]) -> Vec<KnowledgeEntry> {
    raw.iter()
        .enumerate()
        .map(|(i, v)| {
            NewKnowledgeEntry::new("legislation", format!("entry {}", i))
                .with_embedding(to_vector(v))
                .into_entry(i as i64 + 1, Utc::now())
        })
        .collect()
}

#[quickcheck]
fn prop_rank_sorted_and_bounded(query: Vec<i8>, candidates: Vec<Vec<i8>>, limit: u8) -> bool {
    let entries = entries(&candidates);
    let limit = limit as usize;
    let ranked = rank(&to_vector(&query), &entries, limit);

    ranked.len() == limit.min(entries.len())
        && ranked.windows(2).all(|w| {
            w[0].distance < w[1].distance
                || (w[0].distance == w[1].distance && w[0].entry.id < w[1].entry.id)
        })
        && ranked.iter().all(|s| (0.0..=2.0).contains(&s.distance))
}

#[quickcheck]
fn prop_rank_prefix_stable(query: Vec<i8>, candidates: Vec<Vec<i8>>) -> TestResult {
    if candidates.len() < 2 {
        return TestResult::discard();
    }
    let entries = entries(&candidates);
    let query = to_vector(&query);
    let all: Vec<i64> = rank(&query, &entries, entries.len())
        .iter()
        .map(|s| s.entry.id)
        .collect();
    let top: Vec<i64> = rank(&query, &entries, 2).iter().map(|s| s.entry.id).collect();
    TestResult::from_bool(all[..2] == top[..])
}

#[quickcheck]
fn prop_confidence_in_range(distance: f32) -> bool {
    let confidence = confidence_from_distance(distance);
    (0.0..=100.0).contains(&confidence)
}

#[quickcheck]
fn prop_confidence_decreases_with_distance(a: u8, b: u8) -> bool {
    let (near, far) = if a <= b { (a, b) } else { (b, a) };
    confidence_from_distance(near as f32 / 128.0) >= confidence_from_distance(far as f32 / 128.0)
}

#[quickcheck]
fn prop_store_search_matches_rank(query: Vec<i8>, candidates: Vec<Vec<i8>>, limit: u8) -> bool {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let store = InMemoryKnowledgeStore::new(DIMS);
        let mut stored = Vec::new();
        for (i, raw) in candidates.iter().enumerate() {
            let entry = NewKnowledgeEntry::new("legislation", format!("entry {}", i))
                .with_embedding(to_vector(raw));
            stored.push(store.insert(entry).await.unwrap());
        }
        let query = to_vector(&query);
        let limit = limit as usize % 8;

        let from_store: Vec<i64> = store
            .similarity_search(&query, limit, &SearchFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|s| s.entry.id)
            .collect();
        let expected: Vec<i64> = rank(&query, &stored, limit)
            .iter()
            .map(|s| s.entry.id)
            .collect();
        from_store == expected
    })
}

#[quickcheck]
fn prop_total_tokens_is_sum_of_messages(tokens: Vec<u16>) -> bool {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let store = InMemoryConversationStore::new();
        let conversation = store
            .create(NewConversation::chat("advogada-1", "legal-research"))
            .await
            .unwrap();

        for (i, t) in tokens.iter().enumerate() {
            let message = if i % 2 == 0 {
                NewMessage::user(format!("pergunta {}", i))
            } else {
                NewMessage::assistant(format!("resposta {}", i), "legal-research", *t as u64)
            };
            store.append_message(conversation.id, message).await.unwrap();
        }

        let messages = store.list_messages(conversation.id).await.unwrap();
        let sum: u64 = messages.iter().map(|m| m.tokens).sum();
        let positions_increase = messages.windows(2).all(|w| w[0].position < w[1].position);

        store.total_tokens(conversation.id).await.unwrap() == sum && positions_increase
    })
}
