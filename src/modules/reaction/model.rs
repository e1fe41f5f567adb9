use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ReactionPayload {
    /// Client gửi gì lưu nấy, backend không giữ danh sách emoji hợp lệ.
    #[validate(length(min = 1, max = 32))]
    pub emoji: String,
}
