/// Typing Presence Tracker
///
/// Theo dõi ai đang gõ trong conversation nào. State thuần in-process,
/// không persist: restart server thì typing biến mất, đúng với bản chất
/// ephemeral của nó. Mỗi entry mang một deadline; quá deadline coi như
/// đã ngừng gõ dù client không bao giờ gửi tín hiệu stop.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

#[derive(Clone)]
pub struct TypingTracker {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<Uuid, HashMap<Uuid, Instant>>>>,
}

impl TypingTracker {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, HashMap<Uuid, Instant>>> {
        // Lock chỉ poison khi một thread panic giữa chừng; map vẫn dùng được
        // nên lấy lại inner thay vì lan truyền panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ghi nhận tín hiệu typing. Trả về `true` khi tập user đang gõ của
    /// conversation thay đổi thật sự; caller chỉ fan-out khi đó.
    pub fn set(&self, conversation_id: Uuid, user_id: Uuid, is_typing: bool) -> bool {
        let mut map = self.lock();
        if is_typing {
            let entries = map.entry(conversation_id).or_default();
            let was_fresh = entries.get(&user_id).is_some_and(|d| *d > Instant::now());
            entries.insert(user_id, Instant::now() + self.ttl);
            !was_fresh
        } else {
            let Some(entries) = map.get_mut(&conversation_id) else { return false };
            // Gỡ cả entry đã quá hạn: subscriber có thể còn giữ snapshot cũ
            // chưa được sweep chữa, fan-out thêm một lần là vô hại.
            let removed = entries.remove(&user_id).is_some();
            if entries.is_empty() {
                map.remove(&conversation_id);
            }
            removed
        }
    }

    /// Tập user đang gõ, lọc entry quá hạn, sắp theo id cho ổn định.
    /// Chỉ đọc, không dọn: việc dọn và fan-out là của `sweep`.
    pub fn current(&self, conversation_id: &Uuid) -> Vec<Uuid> {
        let map = self.lock();
        let Some(entries) = map.get(conversation_id) else { return Vec::new() };
        let now = Instant::now();
        let mut ids: Vec<Uuid> =
            entries.iter().filter(|(_, deadline)| **deadline > now).map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    /// Gỡ mọi entry quá hạn, trả về các conversation có thay đổi
    /// để hub fan-out "đã ngừng gõ".
    pub fn sweep(&self) -> Vec<Uuid> {
        let mut map = self.lock();
        let now = Instant::now();
        let mut touched = Vec::new();
        map.retain(|conversation_id, entries| {
            let before = entries.len();
            entries.retain(|_, deadline| *deadline > now);
            if entries.len() != before {
                touched.push(*conversation_id);
            }
            !entries.is_empty()
        });
        touched
    }
}
