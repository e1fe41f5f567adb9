/// Notifier Module
///
/// Pub/sub cho trạng thái conversation, theo kiểu "latest-state":
///
/// - Hub actor nhận event từ các service sau mỗi lần ghi store
/// - Mỗi subscriber giữ một feed (channel + guard huỷ đăng ký)
/// - Mỗi lần phát mang nguyên snapshot mới nhất, không mang diff
pub mod events;
pub mod hub;
pub mod reader;
pub mod snapshot;
pub mod subscription;
