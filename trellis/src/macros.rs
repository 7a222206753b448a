/// Creates a single provider [`Message`](crate::Message) from a role shorthand.
///
/// ```rust
/// use trellis::{Role, trellis_msg};
///
/// let message = trellis_msg!(assistant => "Done.");
/// assert_eq!(message.role, Role::Assistant);
/// assert_eq!(message.content, "Done.");
/// ```
#[macro_export]
macro_rules! trellis_msg {
    (system => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::System, $content)
    };
    (user => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::User, $content)
    };
    (assistant => $content:expr $(,)?) => {
        $crate::Message::new($crate::Role::Assistant, $content)
    };
    (tool [$call_id:expr] => $content:expr $(,)?) => {
        $crate::Message::tool_result($call_id, $content)
    };
    ($role:ident => $content:expr $(,)?) => {
        compile_error!("unsupported role: use system, user, assistant, or tool [call_id]");
    };
}

/// Creates a `Vec<Message>` from role/content pairs.
///
/// ```rust
/// use trellis::{Role, trellis_messages};
///
/// let messages = trellis_messages![
///     system => "You are concise.",
///     user => "What time is it in Oslo?",
/// ];
///
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[0].role, Role::System);
/// assert_eq!(messages[1].role, Role::User);
/// ```
#[macro_export]
macro_rules! trellis_messages {
    () => {
        Vec::<$crate::Message>::new()
    };
    ($($role:ident => $content:expr),+ $(,)?) => {
        vec![$($crate::trellis_msg!($role => $content)),+]
    };
}

/// Builds a [`ModelKey`](crate::ModelKey) from a provider and model id.
///
/// ```rust
/// use trellis::model_key;
///
/// let key = model_key!("local", "llama3");
/// assert_eq!(key.to_string(), "local/llama3");
/// ```
#[macro_export]
macro_rules! model_key {
    ($provider:expr, $model:expr $(,)?) => {
        $crate::ModelKey::new($provider, $model)
    };
}
