use justconfig::error::ConfigError;
use justconfig::item::{MapAction, StringItem};

/// Remove quotes from configuration strings.
pub trait Unquote
where
    Self: Sized,
{
    fn unquote(self) -> Result<StringItem, ConfigError>;
}

impl Unquote for Result<StringItem, ConfigError> {
    /// Trims the value and strips one pair of surrounding double quotes, so
    /// `dataset_path = "train.tsv"` and `dataset_path = train.tsv` read the
    /// same. Values without quotes are kept as they are.
    fn unquote(self) -> Result<StringItem, ConfigError> {
        self?.map(|v| {
            let v = v.trim();

            if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
                MapAction::Replace(vec![v[1..v.len() - 1].to_owned()])
            } else {
                MapAction::Replace(vec![v.to_owned()])
            }
        })
    }
}

#[cfg(test)]
mod config_processors_test {
    use justconfig::item::ValueExtractor;
    use justconfig::sources::defaults::Defaults;
    use justconfig::{ConfPath, Config};

    use super::*;

    fn unquoted(raw: &str) -> String {
        let mut conf = Config::default();
        let mut defaults = Defaults::default();
        defaults.set(conf.root().push_all(&["model", "similarity"]), raw, "unit test");
        conf.add_source(defaults);

        conf.get(ConfPath::from(&["model", "similarity"]))
            .unquote()
            .value()
            .unwrap()
    }

    #[test]
    fn should_strip_surrounding_quotes() {
        assert_eq!("jaccard", unquoted("\"jaccard\""));
        assert_eq!("cosine", unquoted("  cosine "));
        assert_eq!("\"", unquoted("\""));
    }
}
