use lazy_static::lazy_static;
use tiktoken_rs::{get_bpe_from_tokenizer, tokenizer::Tokenizer, CoreBPE};

lazy_static! {
    static ref CL100K_BASE: Option<CoreBPE> = get_bpe_from_tokenizer(Tokenizer::Cl100kBase).ok();
}

/// Token count under the cl100k_base encoding. Falls back to a 4 chars per token
/// estimate if the encoding can't be loaded.
pub fn num_tokens(text: &str) -> usize {
    match CL100K_BASE.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_tokens_counts_words() {
        assert_eq!(num_tokens(""), 0);
        assert!(num_tokens("hello world") >= 2);
        assert!(num_tokens("a much longer sentence than before") > num_tokens("short"));
    }
}
