use crate::config::Config;
use crate::error::ConfigError;

/// Merge an overlay TOML fragment on top of a base [`Config`].
///
/// Values present in `overlay_toml` override those in `base`; tables are
/// merged key by key, arrays are replaced whole. Works by converting both
/// sides to [`toml::Value`] tables, deep-merging, then deserializing back.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut base_val =
        toml::Value::try_from(base).map_err(|e| ConfigError::parse("base config", e))?;

    let overlay_val: toml::Value =
        toml::from_str(overlay_toml).map_err(|e| ConfigError::parse("overlay", e))?;

    merge_values(&mut base_val, &overlay_val);

    base_val
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::parse("overlay", e))
}

fn merge_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, val) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_val) => merge_values(base_val, val),
                    None => {
                        base_table.insert(key.clone(), val.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}
