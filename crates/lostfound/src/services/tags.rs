//! Tag extraction from free text
//!
//! Tags make records searchable in the browse flow. Extraction must be deterministic:
//! the same text always yields the same set.

use jieba_rs::Jieba;
use std::collections::BTreeSet;

/// Derives searchable tags from report text
pub trait TagExtractor: Send + Sync {
    fn extract_tags(&self, text: &str) -> BTreeSet<String>;
}

/// Part-of-speech tags kept as search tags: place names and common nouns
const KEPT_POS: &[&str] = &["ns", "n"];

/// Segments text with jieba and keeps place names and nouns.
///
/// Configured cities are added to the dictionary as place names so they always
/// survive segmentation as whole words. HMM discovery of unknown words is off,
/// which keeps the output a pure function of the dictionary.
pub struct JiebaTagExtractor {
    jieba: Jieba,
}

impl JiebaTagExtractor {
    pub fn new() -> Self {
        Self {
            jieba: Jieba::new(),
        }
    }

    pub fn with_cities(cities: &[String]) -> Self {
        let mut extractor = Self::new();
        for city in cities.iter().filter(|c| !c.is_empty()) {
            extractor.jieba.add_word(city, None, Some("ns"));
        }
        extractor
    }
}

impl Default for JiebaTagExtractor {
    fn default() -> Self {
        Self::with_cities(&crate::config::default_cities())
    }
}

impl TagExtractor for JiebaTagExtractor {
    fn extract_tags(&self, text: &str) -> BTreeSet<String> {
        self.jieba
            .tag(text, false)
            .into_iter()
            .filter(|t| KEPT_POS.contains(&t.tag))
            .map(|t| t.word.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_places_and_nouns() {
        let extractor = JiebaTagExtractor::default();
        let tags = extractor.extract_tags("北京钱包在地铁站丢了,里面有身份证");
        assert!(tags.contains("北京"));
        assert!(tags.contains("钱包"));
        assert!(tags.contains("身份证"));
        assert!(!tags.contains("丢"));
        assert!(!tags.contains("了"));
    }

    #[test]
    fn test_items_outside_any_fixed_list() {
        let extractor = JiebaTagExtractor::default();
        let tags = extractor.extract_tags("上海自行车");
        assert!(tags.contains("上海"));
        assert!(tags.contains("自行车"));
    }

    #[test]
    fn test_configured_city_is_one_place_word() {
        let extractor = JiebaTagExtractor::with_cities(&["雄安新区".to_string()]);
        let tags = extractor.extract_tags("雄安新区钥匙");
        assert!(tags.contains("雄安新区"));
        assert!(tags.contains("钥匙"));
    }

    #[test]
    fn test_deterministic() {
        let extractor = JiebaTagExtractor::default();
        let text = "成都雨伞灰色折叠伞,在地铁上丢的";
        assert_eq!(extractor.extract_tags(text), extractor.extract_tags(text));
    }

    #[test]
    fn test_empty_text() {
        let extractor = JiebaTagExtractor::default();
        assert!(extractor.extract_tags("").is_empty());
    }
}
