/// WebSocket Module
///
/// Module này cung cấp real-time communication capability cho chat application
/// thông qua WebSocket protocol. Nó bao gồm:
///
/// - Message protocol (ClientMessage & ServerMessage)
/// - WebSocket Session actor (xử lý từng connection, giữ feed guards)
/// - HTTP handler (upgrade HTTP thành WebSocket)
pub mod handler;
pub mod message;
pub mod session;
