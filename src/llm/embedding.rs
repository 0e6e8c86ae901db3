//! 嵌入：供文档库后端计算向量相似度
//!
//! - HashEmbedder：分词后做特征哈希，固定维度、L2 归一化，无外部调用，默认使用
//! - OpenAiEmbedder：调用 OpenAI 兼容的 /embeddings 端点

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingSection;
use crate::memory::tokenizer;

/// 嵌入提供方：将文本编码为向量；失败时返回错误字符串
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;

    /// 批量编码，默认逐条调用
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// 特征哈希嵌入：同样的文本永远得到同样的向量
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let n = u64::from_le_bytes(raw);
        let index = (n % self.dimensions as u64) as usize;
        // 符号位减少哈希碰撞带来的偏置
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenizer::tokenize(text) {
            let (index, sign) = self.bucket(&token);
            vector[index] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(self.embed_text(text))
    }
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }
}

/// 按 [embedding] 段选择嵌入提供方；openai 缺少 API Key 时退回哈希嵌入
pub fn create_embedder_from_config(
    cfg: &EmbeddingSection,
    base_url: Option<&str>,
) -> Arc<dyn EmbeddingProvider> {
    if cfg.provider.eq_ignore_ascii_case("openai") {
        let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        if let Some(key) = key {
            tracing::info!("Using OpenAI embeddings ({})", cfg.model);
            return Arc::new(OpenAiEmbedder::new(base_url, &cfg.model, Some(&key)));
        }
        tracing::warn!("embedding provider openai requested but OPENAI_API_KEY is unset, using hash embedder");
    }
    Arc::new(HashEmbedder::new(cfg.dimensions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("我喜欢喝茶").await.unwrap();
        let b = embedder.embed("我喜欢喝茶").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero() {
        let embedder = HashEmbedder::default();
        assert!(embedder.embed_text("   ").iter().all(|x| *x == 0.0));
    }
}
