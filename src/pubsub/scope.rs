use std::ops::Deref;

use tracing::debug;
use zpubsub_error::ZResult;

use super::{PubSub, Role, Serializer};

/// Область работы клиента в одной роли.
///
/// Создаётся через [`PubSub::scope`]: роль закреплена, соединение уже
/// захвачено. [`RoleScope::release`] закрывает клиент с ожиданием; если
/// страж просто уничтожен, клиент помечается закрытым, а соединение
/// закрывается фоновой задачей.
pub struct RoleScope<'a, S: Serializer> {
    client: &'a PubSub<S>,
    role: Role,
    released: bool,
}

impl<'a, S: Serializer> RoleScope<'a, S> {
    pub(crate) async fn enter(
        client: &'a PubSub<S>,
        role: Role,
    ) -> ZResult<Self> {
        let backend = client.backend();
        backend.pin(role)?;
        backend.acquire().await?;
        debug!(role = %role, "Role scope entered");
        Ok(Self {
            client,
            role,
            released: false,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Закрывает клиент и дожидается освобождения соединения.
    pub async fn release(mut self) -> ZResult<()> {
        self.released = true;
        self.client.close().await
    }
}

impl<S: Serializer> Deref for RoleScope<'_, S> {
    type Target = PubSub<S>;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl<S: Serializer> Drop for RoleScope<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            debug!(role = %self.role, "Role scope dropped, closing in background");
            self.client.close_in_background();
        }
    }
}
