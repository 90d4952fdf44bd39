use std::io;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{ser::Formatter, Value};
use zpubsub_error::{SerializerError, ZResult};

/// Кодек полезной нагрузки сообщений.
///
/// `loads(None)` декодирует отсутствующие данные как `null`.
pub trait Serializer: Send + Sync + 'static {
    fn dumps<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> ZResult<String>;

    fn loads<T: DeserializeOwned>(
        &self,
        text: Option<&str>,
    ) -> ZResult<T>;
}

/// JSON-кодек по умолчанию.
///
/// Пишет разделители `", "` и `": "`, так что `{"test": 1}` на проводе
/// выглядит одинаково для всех клиентов брокера.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

/// Форматтер JSON с пробелами после `,` и `:`.
#[derive(Debug, Clone, Copy, Default)]
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(
        &mut self,
        writer: &mut W,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

impl Serializer for JsonSerializer {
    fn dumps<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> ZResult<String> {
        let mut buf = Vec::with_capacity(64);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        value
            .serialize(&mut ser)
            .map_err(|e| SerializerError::Encode {
                reason: e.to_string(),
            })?;
        String::from_utf8(buf).map_err(|e| {
            SerializerError::Encode {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn loads<T: DeserializeOwned>(
        &self,
        text: Option<&str>,
    ) -> ZResult<T> {
        let decoded = match text {
            Some(text) => serde_json::from_str(text),
            None => serde_json::from_value(Value::Null),
        };
        decoded.map_err(|e| SerializerError::from(e).into())
    }
}
