//! 排名与融合：向量相似度、关键词得分、RRF（Reciprocal Rank Fusion）
//!
//! 本地后端共用。RRF 分数相同时按首次出现顺序（先关键词列表，后向量列表）稳定排序。

use std::collections::HashMap;

use super::document_store::{DocumentRecord, ScoredDocument};
use super::tokenizer;

/// RRF 常数
pub const RRF_K: f32 = 60.0;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 关键词得分：整句子串命中加 1，再加分词 Jaccard 重叠
pub fn keyword_score(keyword: &str, document: &str) -> f32 {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return 0.0;
    }
    let document_lower = document.to_lowercase();
    let exact = if document_lower.contains(&keyword) { 1.0 } else { 0.0 };
    let overlap = tokenizer::jaccard_similarity(
        &tokenizer::tokenize_to_set(&keyword),
        &tokenizer::tokenize_to_set(document),
    );
    exact + overlap
}

/// 对 (record, score) 按分数降序稳定排序，取前 n
pub fn top_n(mut scored: Vec<(f32, DocumentRecord)>, n: usize) -> Vec<ScoredDocument> {
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(n)
        .map(|(score, record)| ScoredDocument { record, score })
        .collect()
}

/// 向量排名：返回最近的 n 条，不论相似度正负
pub fn rank_by_vector<'a, I>(query: &[f32], rows: I, n: usize) -> Vec<ScoredDocument>
where
    I: IntoIterator<Item = (&'a DocumentRecord, &'a [f32])>,
{
    let scored = rows
        .into_iter()
        .map(|(record, embedding)| (cosine_similarity(query, embedding), record.clone()))
        .collect();
    top_n(scored, n)
}

/// 关键词排名
pub fn rank_by_keyword<'a, I>(keyword: &str, rows: I, n: usize) -> Vec<ScoredDocument>
where
    I: IntoIterator<Item = &'a DocumentRecord>,
{
    // 没有命中任何词的文档不进入关键词排名
    let scored = rows
        .into_iter()
        .map(|record| (keyword_score(keyword, &record.document), record))
        .filter(|(score, _)| *score > 0.0)
        .map(|(score, record)| (score, record.clone()))
        .collect();
    top_n(scored, n)
}

/// RRF 融合多个排名列表：score(d) = Σ 1 / (k + rank + 1)
pub fn reciprocal_rank_fuse(rankings: &[Vec<ScoredDocument>], k: f32) -> Vec<ScoredDocument> {
    let mut order: Vec<ScoredDocument> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for ranking in rankings {
        for (rank, hit) in ranking.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f32 + 1.0);
            match position.get(&hit.record.id) {
                Some(&idx) => order[idx].score += contribution,
                None => {
                    position.insert(hit.record.id.clone(), order.len());
                    order.push(ScoredDocument {
                        record: hit.record.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    // sort_by 是稳定排序：同分保留首次出现顺序
    order.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    order
}

/// 完整混合排名：关键词与向量各取 pool 条，融合后截断到 n
pub fn hybrid_rank<'a, I>(
    keyword: &str,
    query_embedding: &[f32],
    rows: I,
    pool: usize,
    n: usize,
) -> Vec<ScoredDocument>
where
    I: IntoIterator<Item = (&'a DocumentRecord, &'a [f32])> + Clone,
{
    let keyword_hits = rank_by_keyword(keyword, rows.clone().into_iter().map(|(r, _)| r), pool);
    let vector_hits = rank_by_vector(query_embedding, rows, pool);
    let mut fused = reciprocal_rank_fuse(&[keyword_hits, vector_hits], RRF_K);
    fused.truncate(n);
    fused
}
