use std::fmt;

use serde::{Deserialize, Serialize};

/// Тип доставленного сообщения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Доставка по точной подписке на канал.
    Message,
    /// Доставка по подписке на шаблон.
    PMessage,
}

/// Нормализованное сообщение, которое отдаёт `listen`.
///
/// `pattern` присутствует только для [`MessageKind::PMessage`]; `channel` и
/// `pattern` уже без пространства имён, `data` декодирована.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord<T> {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub channel: String,
    pub data: T,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::PMessage => "pmessage",
        }
    }
}

impl<T> MessageRecord<T> {
    pub fn is_pattern(&self) -> bool {
        self.kind == MessageKind::PMessage
    }
}

impl fmt::Display for MessageKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
