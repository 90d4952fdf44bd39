use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

use serde::{Deserialize, Serialize};
use zpubsub_error::ZResult;

use crate::error::PubSubError;

const UNSET: u8 = 0;
const PUBLISHER: u8 = 1;
const SUBSCRIBER: u8 = 2;

/// Назначение соединения: публикация или подписка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Publisher,
    Subscriber,
}

/// Однократно устанавливаемая роль соединения.
///
/// После установки роль может быть только сброшена через [`RoleGuard::clear`]
/// или повторно установлена в то же значение.
#[derive(Debug)]
pub struct RoleGuard {
    state: AtomicU8,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Role {
    fn as_u8(self) -> u8 {
        match self {
            Role::Publisher => PUBLISHER,
            Role::Subscriber => SUBSCRIBER,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            PUBLISHER => Some(Role::Publisher),
            SUBSCRIBER => Some(Role::Subscriber),
            _ => None,
        }
    }
}

impl RoleGuard {
    /// Создаёт guard, опционально сразу закреплённый за ролью.
    pub fn new(initial: Option<Role>) -> Self {
        Self {
            state: AtomicU8::new(initial.map_or(UNSET, Role::as_u8)),
        }
    }

    /// Закрепляет роль.
    ///
    /// Повторная установка той же роли ничего не делает; попытка сменить
    /// уже закреплённую роль возвращает [`PubSubError::RoleConflict`].
    pub fn set(
        &self,
        role: Role,
    ) -> ZResult<()> {
        match self
            .state
            .compare_exchange(UNSET, role.as_u8(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(current) if current == role.as_u8() => Ok(()),
            Err(current) => Err(PubSubError::RoleConflict {
                current: Role::from_u8(current).unwrap_or(role),
                requested: role,
            }
            .into()),
        }
    }

    /// Текущая роль, если закреплена.
    pub fn get(&self) -> Option<Role> {
        Role::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Сбрасывает роль. Вызывается только при закрытии соединения.
    pub fn clear(&self) {
        self.state.store(UNSET, Ordering::Release);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for Role {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
        }
    }
}

impl Default for RoleGuard {
    fn default() -> Self {
        Self::new(None)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
