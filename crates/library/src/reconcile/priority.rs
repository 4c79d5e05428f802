use tome_media::DataSource;

use crate::error::{Error, ErrorKind, Result};

/// Ordered list of metadata sources, most authoritative first.
///
/// Manual edits always come first. Only the relative order of the automatic
/// sources can be configured.
///
/// ```
/// use tome_library::Priority;
/// use tome_media::DataSource;
///
/// let priority = Priority::default();
/// assert!(priority.should_overwrite(Some(DataSource::Format), DataSource::Sidecar));
/// assert!(!priority.should_overwrite(Some(DataSource::Manual), DataSource::Sidecar));
/// assert!(priority.should_overwrite(None, DataSource::Filepath));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Priority {
    order: Vec<DataSource>,
}
impl Default for Priority {
    fn default() -> Self {
        Self {
            order: DataSource::ALL.to_vec(),
        }
    }
}
impl Priority {
    /// Build a priority order from configuration.
    ///
    /// `Manual` may be omitted, in which case it is prepended. Every other
    /// source must be listed exactly once.
    pub fn new(order: &[DataSource]) -> Result<Self> {
        let invalid = |reason: &str| Error::from(ErrorKind::InvalidConfig(format!("metadata priority {reason}")));
        let mut resolved = match order.first() {
            Some(DataSource::Manual) => Vec::new(),
            _ => vec![DataSource::Manual],
        };
        for source in order {
            if resolved.contains(source) {
                return Err(match source {
                    DataSource::Manual => invalid("must list manual first"),
                    other => invalid(&format!("lists {other} twice")),
                });
            }
            resolved.push(*source);
        }
        if let Some(missing) = DataSource::ALL.iter().find(|s| !resolved.contains(s)) {
            return Err(invalid(&format!("is missing {missing}")));
        }
        Ok(Self { order: resolved })
    }

    pub fn order(&self) -> &[DataSource] {
        &self.order
    }

    /// Position of a source; lower is more authoritative.
    pub fn rank(&self, source: DataSource) -> usize {
        self.order.iter().position(|s| *s == source).unwrap_or(self.order.len())
    }

    /// Whether a value from `incoming` may replace one from `current`.
    ///
    /// Equal sources overwrite, so a rescan picks up changes made at the same
    /// level. A field with no current value always accepts.
    pub fn should_overwrite(&self, current: Option<DataSource>, incoming: DataSource) -> bool {
        current.is_none_or(|current| self.rank(incoming) <= self.rank(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DataSource::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, Filepath, true)]
    #[case(Some(Filepath), Filepath, true)]
    #[case(Some(Filepath), Format, true)]
    #[case(Some(Format), Filepath, false)]
    #[case(Some(Format), Sidecar, true)]
    #[case(Some(Sidecar), Format, false)]
    #[case(Some(Manual), Sidecar, false)]
    #[case(Some(Manual), Manual, true)]
    fn test_default_order(#[case] current: Option<DataSource>, #[case] incoming: DataSource, #[case] expected: bool) {
        assert_eq!(Priority::default().should_overwrite(current, incoming), expected);
    }

    #[test]
    fn test_format_above_sidecar() {
        let priority = Priority::new(&[Format, Sidecar, Filepath]).unwrap();
        assert_eq!(priority.order(), &[Manual, Format, Sidecar, Filepath]);
        assert!(priority.should_overwrite(Some(Sidecar), Format));
        assert!(!priority.should_overwrite(Some(Format), Sidecar));
        assert!(!priority.should_overwrite(Some(Manual), Format));
    }

    #[rstest]
    #[case(&[Sidecar, Manual, Format, Filepath])]
    #[case(&[Sidecar, Format])]
    #[case(&[Sidecar, Format, Format, Filepath])]
    fn test_invalid_orders(#[case] order: &[DataSource]) {
        let err = Priority::new(order).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(_)));
    }

    /// Walking every ordered pair, a source can only ever replace itself or
    /// something ranked below it.
    #[test]
    fn test_monotonic() {
        let priority = Priority::default();
        for (i, current) in priority.order().iter().enumerate() {
            for (j, incoming) in priority.order().iter().enumerate() {
                assert_eq!(priority.should_overwrite(Some(*current), *incoming), j <= i);
            }
        }
    }
}
