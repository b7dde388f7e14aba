#[derive(Debug, Clone)]
pub enum ChatAction {
    // Conversation
    OpenConversation { conversation_id: String },
    CloseConversation,
    RefreshConversation,
    SendMessage { text: String },

    // Surface
    SurfaceOpened,
    SurfaceClosed,
    SurfaceFocused,
    SurfaceBlurred,

    // UI
    ClearToast,
}

impl ChatAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            // Conversation
            ChatAction::OpenConversation { .. } => "OpenConversation",
            ChatAction::CloseConversation => "CloseConversation",
            ChatAction::RefreshConversation => "RefreshConversation",
            ChatAction::SendMessage { .. } => "SendMessage",

            // Surface
            ChatAction::SurfaceOpened => "SurfaceOpened",
            ChatAction::SurfaceClosed => "SurfaceClosed",
            ChatAction::SurfaceFocused => "SurfaceFocused",
            ChatAction::SurfaceBlurred => "SurfaceBlurred",

            // UI
            ChatAction::ClearToast => "ClearToast",
        }
    }
}
