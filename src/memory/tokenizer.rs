//! 分词：中英文混合
//!
//! 关键词检索与哈希嵌入共用。含 CJK 字符时走 jieba 搜索引擎模式，纯英文按空白切分；
//! 只保留至少含一个字母或数字的词。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn is_word(token: &str) -> bool {
    let mut chars = token.chars().filter(|c| c.is_alphanumeric());
    match chars.next() {
        None => false,
        // 单个英文字母噪声太大，单个汉字保留
        Some(first) => is_cjk(first) || chars.next().is_some(),
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| is_word(s))
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
            .map(|s| s.to_lowercase())
            .filter(|s| is_word(s))
            .collect()
    }
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

pub fn jaccard_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f32 {
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }
    let intersection = set1.intersection(set2).count() as f32;
    let union = set1.union(set2).count() as f32;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("我喜欢喝茶");
        assert!(!tokens.is_empty());
        assert!(tokens.iter().any(|t| t.contains('茶')));
    }

    #[test]
    fn test_tokenize_english_drops_punctuation() {
        let tokens = tokenize("I like programming, and AI!");
        assert!(tokens.contains(&"programming".to_string()));
        assert!(tokens.contains(&"ai".to_string()));
        assert!(!tokens.iter().any(|t| t.contains(',')));
    }

    #[test]
    fn test_tokenize_skips_punctuation_only_tokens() {
        let tokens = tokenize("记住：我喜欢喝茶。");
        assert!(tokens.iter().all(|t| t.chars().any(|c| c.is_alphanumeric())));
    }

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("你好"));
        assert!(contains_cjk("Hello 世界"));
        assert!(!contains_cjk("Hello World"));
    }

    #[test]
    fn test_jaccard_similarity() {
        let set1 = tokenize_to_set("我喜欢编程");
        let set2 = tokenize_to_set("我也喜欢编程");
        assert!(jaccard_similarity(&set1, &set2) > 0.0);
        assert_eq!(jaccard_similarity(&set1, &HashSet::new()), 0.0);
    }
}
