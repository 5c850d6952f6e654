//! One-shot pattern interception over accumulated process output.
//!
//! Rules are tested against the whole output accumulated so far, never a
//! single chunk, so text straddling a chunk boundary still matches. A rule
//! fires at most once and never consumes or alters the output.

use regex::Regex;
use tokio::sync::oneshot;

type Callback = Box<dyn FnOnce(&str) + Send>;

/// A pattern plus a callback that fires on the first match.
pub struct InterceptRule {
    pattern: Regex,
    callback: Option<Callback>,
}

impl InterceptRule {
    /// Create a rule invoking `callback` with the matched text.
    pub fn new(pattern: Regex, callback: impl FnOnce(&str) + Send + 'static) -> Self {
        Self {
            pattern,
            callback: Some(Box::new(callback)),
        }
    }

    /// Create a rule that delivers the matched text through a oneshot channel.
    #[must_use]
    pub fn notify(pattern: Regex) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let rule = Self::new(pattern, move |matched| {
            let _ = tx.send(matched.to_owned());
        });
        (rule, rx)
    }

    /// Whether the callback has already fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.callback.is_none()
    }

    /// Test `accumulated`; fires the callback on the first match only.
    ///
    /// Returns `true` only for the call that fired.
    pub fn test(&mut self, accumulated: &str) -> bool {
        if self.callback.is_none() {
            return false;
        }
        let Some(found) = self.pattern.find(accumulated) else {
            return false;
        };
        if let Some(callback) = self.callback.take() {
            callback(found.as_str());
        }
        true
    }
}

impl std::fmt::Debug for InterceptRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptRule")
            .field("pattern", &self.pattern.as_str())
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// Accumulated output plus the rules watching it.
#[derive(Debug, Default)]
pub struct PatternInterceptor {
    accumulated: String,
    rules: Vec<InterceptRule>,
}

impl PatternInterceptor {
    /// Create an interceptor armed with `rules`.
    #[must_use]
    pub fn new(rules: Vec<InterceptRule>) -> Self {
        Self {
            accumulated: String::new(),
            rules,
        }
    }

    /// Append a chunk and test every rule that has not fired yet.
    ///
    /// Returns the number of rules that fired on this chunk.
    pub fn observe(&mut self, chunk: &str) -> usize {
        self.accumulated.push_str(chunk);
        let accumulated = &self.accumulated;
        self.rules
            .iter_mut()
            .filter(|rule| !rule.has_fired())
            .map(|rule| rule.test(accumulated))
            .filter(|fired| *fired)
            .count()
    }

    /// Everything observed so far.
    #[must_use]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }
}
