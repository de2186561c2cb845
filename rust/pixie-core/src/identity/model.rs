use std::fmt;

/// Model numbers whose high byte is 1 are Pixie DevKit boards; the low byte
/// is the board revision.
const PIXIE_DEVKIT_FAMILY: u32 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelName {
    Uninitialized,
    Failed,
    Model(u32),
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ModelName::Uninitialized => f.write_str("[uninitialized]"),
            ModelName::Failed => f.write_str("[failed]"),
            ModelName::Model(model) if model >> 8 == PIXIE_DEVKIT_FAMILY => {
                write!(f, "Firefly Pixie (DevKit rev.{})", model & 0xff)
            }
            ModelName::Model(model) => write!(f, "Unknown model: 0x{:x}", model),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("model name truncated: {required} bytes required, {available} available")]
pub struct Truncated {
    pub required: usize,
    pub available: usize,
}

/// Writes the rendered name into `out`. When it does not fit, the prefix that
/// fits is written and `Truncated` is returned instead of the text.
pub fn render_model_name(name: ModelName, out: &mut [u8]) -> Result<&str, Truncated> {
    let rendered = name.to_string();
    let bytes = rendered.as_bytes();

    if bytes.len() > out.len() {
        let available = out.len();
        out.copy_from_slice(&bytes[..available]);
        return Err(Truncated {
            required: bytes.len(),
            available,
        });
    }

    out[..bytes.len()].copy_from_slice(bytes);
    // Rendered names are ASCII.
    Ok(std::str::from_utf8(&out[..bytes.len()]).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devkit_names() {
        assert_eq!(
            ModelName::Model(0x0101).to_string(),
            "Firefly Pixie (DevKit rev.1)"
        );
        assert_eq!(
            ModelName::Model(0x0106).to_string(),
            "Firefly Pixie (DevKit rev.6)"
        );
    }

    #[test]
    fn test_status_names() {
        assert_eq!(ModelName::Uninitialized.to_string(), "[uninitialized]");
        assert_eq!(ModelName::Failed.to_string(), "[failed]");
    }

    #[test]
    fn test_unknown_model() {
        assert_eq!(
            ModelName::Model(0x0201).to_string(),
            "Unknown model: 0x201"
        );
        assert_eq!(
            ModelName::Model(0xdeadbeef).to_string(),
            "Unknown model: 0xdeadbeef"
        );
    }

    #[test]
    fn test_render_fits() {
        let mut buffer = [0u8; 64];
        let text = render_model_name(ModelName::Model(0x0101), &mut buffer).unwrap();
        assert_eq!(text, "Firefly Pixie (DevKit rev.1)");
    }

    #[test]
    fn test_render_exact_fit() {
        let mut buffer = [0u8; 8];
        let text = render_model_name(ModelName::Failed, &mut buffer).unwrap();
        assert_eq!(text, "[failed]");
    }

    #[test]
    fn test_render_truncated() {
        let mut buffer = [0u8; 10];
        let err = render_model_name(ModelName::Model(0x0101), &mut buffer).unwrap_err();
        assert_eq!(err.required, 28);
        assert_eq!(err.available, 10);
        assert_eq!(&buffer, b"Firefly Pi");
    }

    #[test]
    fn test_render_empty_buffer() {
        let mut buffer = [0u8; 0];
        assert!(render_model_name(ModelName::Uninitialized, &mut buffer).is_err());
    }
}
