use uuid::Uuid;

use crate::{
    api::error::ChatError,
    modules::conversation::{
        model::{ConversationDetail, Profile},
        schema::ConversationEntity,
    },
};

/// Khoá singleton cho team conversation, cùng cột với pair key của direct.
pub const TEAM_KEY: &str = "team";

/// Pair key không phụ thuộc thứ tự hai user, dùng làm khoá unique
/// để N lần resolve đồng thời chỉ tạo đúng một conversation.
pub fn pair_key(a: &Uuid, b: &Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// Mỗi method là một đơn vị atomic trên đúng một conversation: backend Postgres
/// khoá row (`FOR UPDATE`), backend in-memory khoá cell. Nhờ vậy service không
/// phải cầm transaction xuyên qua nhiều repository.
#[async_trait::async_trait]
pub trait ConversationRepository {
    /// Trả về `(entity, changed)`, trong đó `changed` đúng khi store có ghi
    /// gì đó (tạo mới hoặc thêm thành viên), caller dựa vào đó để fan-out.
    async fn resolve_direct(
        &self,
        a: &Profile,
        b: &Profile,
    ) -> Result<(ConversationEntity, bool), ChatError>;

    async fn resolve_team(
        &self,
        name: &str,
        roster: &[Profile],
    ) -> Result<(ConversationEntity, bool), ChatError>;

    async fn create_group(
        &self,
        creator: &Profile,
        members: &[Profile],
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ConversationEntity, ChatError>;

    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, ChatError>;

    async fn find_detail(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationDetail>, ChatError>;

    /// Sắp theo `updated_at` giảm dần.
    async fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<ConversationDetail>, ChatError>;

    /// Idempotent: thành viên đã có thì chỉ refresh display_name/photo_url.
    /// Trả về danh sách user sau khi thêm và cờ `added`.
    async fn add_participant(
        &self,
        conversation_id: &Uuid,
        member: &Profile,
    ) -> Result<(Vec<Uuid>, bool), ChatError>;

    /// Trả về danh sách user TRƯỚC khi xoá (gồm cả người bị xoá) và cờ `removed`.
    async fn remove_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(Vec<Uuid>, bool), ChatError>;

    async fn participant_ids(&self, conversation_id: &Uuid) -> Result<Vec<Uuid>, ChatError>;

    async fn is_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<bool, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_eq!(pair_key(&a, &b), pair_key(&b, &a));
        assert_ne!(pair_key(&a, &b), pair_key(&a, &a));
    }
}
