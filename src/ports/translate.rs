/// Message catalogue lookup. Implementations fall back to the key itself when
/// no message is known.
pub trait Translator: Send + Sync {
    fn translate(&self, domain: &str, key: &str, args: &[(&str, &str)]) -> String;
}
