use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// In-memory per-user message cooldowns, keyed by `(guild_id, user_id)`.
///
/// Bounded so a busy guild cannot grow it without limit; an evicted entry just
/// means that user may earn a point slightly early. Not persisted.
#[derive(Clone)]
pub struct CooldownCache {
    cache: Arc<Mutex<LruCache<(u64, u64), Instant>>>,
    window: Duration,
}

impl CooldownCache {
    pub fn new(capacity: usize, window: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
            window,
        }
    }

    /// True when the user has no recorded use inside the window.
    pub fn is_ready(&self, guild_id: u64, user_id: u64, now: Instant) -> bool {
        let Ok(mut cache) = self.cache.lock() else {
            return false;
        };
        match cache.get(&(guild_id, user_id)) {
            Some(last) => now.saturating_duration_since(*last) >= self.window,
            None => true,
        }
    }

    pub fn record(&self, guild_id: u64, user_id: u64, now: Instant) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put((guild_id, user_id), now);
        }
    }

    /// Drops entries whose window has passed. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let Ok(mut cache) = self.cache.lock() else {
            return 0;
        };
        let expired: Vec<(u64, u64)> = cache
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) >= self.window)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the message log needs to know about a message after it changes or disappears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
    pub attachments: Vec<String>,
    pub sent_at: i64,
}

/// Recent guild messages keyed by message id, bounded the same way as [`CooldownCache`].
#[derive(Clone)]
pub struct MessageCache {
    cache: Arc<Mutex<LruCache<u64, CachedMessage>>>,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn insert(&self, message_id: u64, message: CachedMessage) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(message_id, message);
        }
    }

    /// Swaps in the edited content and returns the message as it was before.
    pub fn replace_content(&self, message_id: u64, content: &str) -> Option<CachedMessage> {
        let mut cache = self.cache.lock().ok()?;
        let cached = cache.get_mut(&message_id)?;
        let before = cached.clone();
        cached.content = content.to_string();
        Some(before)
    }

    pub fn remove(&self, message_id: u64) -> Option<CachedMessage> {
        self.cache.lock().ok()?.pop(&message_id)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_gates_inside_window() {
        let cache = CooldownCache::new(10, Duration::from_secs(60));
        let start = Instant::now();

        assert!(cache.is_ready(1, 7, start));
        cache.record(1, 7, start);

        assert!(!cache.is_ready(1, 7, start + Duration::from_secs(59)));
        assert!(cache.is_ready(1, 7, start + Duration::from_secs(60)));

        // Other guilds and users are tracked separately
        assert!(cache.is_ready(2, 7, start));
        assert!(cache.is_ready(1, 8, start));
    }

    #[test]
    fn test_purge_expired() {
        let cache = CooldownCache::new(10, Duration::from_secs(60));
        let start = Instant::now();

        cache.record(1, 1, start);
        cache.record(1, 2, start + Duration::from_secs(30));

        assert_eq!(cache.purge_expired(start + Duration::from_secs(61)), 1);
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_ready(1, 2, start + Duration::from_secs(61)));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = CooldownCache::new(2, Duration::from_secs(60));
        let now = Instant::now();

        cache.record(1, 1, now);
        cache.record(1, 2, now);
        cache.record(1, 3, now);

        assert_eq!(cache.len(), 2);
        // Least recently used entry was evicted
        assert!(cache.is_ready(1, 1, now));
    }

    fn cached(content: &str) -> CachedMessage {
        CachedMessage {
            channel_id: 5,
            author_id: 7,
            author_name: "sam".to_string(),
            content: content.to_string(),
            attachments: vec![],
            sent_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_message_cache_tracks_edits_and_deletes() {
        let messages = MessageCache::new(10);
        messages.insert(1, cached("first"));

        let before = messages.replace_content(1, "second").unwrap();
        assert_eq!(before.content, "first");
        assert!(messages.replace_content(2, "unknown").is_none());

        assert_eq!(messages.remove(1).unwrap().content, "second");
        assert!(messages.remove(1).is_none());
        assert!(messages.is_empty());
    }

    #[test]
    fn test_message_cache_is_bounded() {
        let messages = MessageCache::new(2);
        messages.insert(1, cached("a"));
        messages.insert(2, cached("b"));
        messages.insert(3, cached("c"));

        assert_eq!(messages.len(), 2);
        assert!(messages.remove(1).is_none());
    }
}
