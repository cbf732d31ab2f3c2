use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{ShellError, toplevel::OrphanPolicy};

const KNOWN_KEYS: &[&str] = &[
    "output",
    "window_list.middle_click_close",
    "window_list.orphan_policy",
    "ipc.enabled",
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Name of the output (e.g. `DP-1`) this shell instance serves. `None`
    /// binds to the first output the compositor announces.
    pub output: Option<String>,
    pub window_list: WindowListConfig,
    pub ipc: IpcConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowListConfig {
    pub middle_click_close: bool,
    pub orphan_policy: OrphanPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpcConfig {
    pub enabled: bool,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl RuntimeConfig {
    pub fn wants_output(&self, name: &str) -> bool {
        self.output.as_deref().is_none_or(|wanted| wanted == name)
    }
}

pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: RuntimeConfig,
}

pub fn load_or_create_default() -> Result<LoadedConfig, ShellError> {
    let path = config_path()?;
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                ShellError::Config(format!(
                    "failed to create config directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        fs::write(&path, default_config_template()).map_err(|err| {
            ShellError::Config(format!(
                "failed to write default config {}: {err}",
                path.display()
            ))
        })?;
        tracing::info!(path = %path.display(), "created default config.lua");
    }

    let config = load_from_path(&path)?;
    Ok(LoadedConfig { path, config })
}

pub fn load_from_path(path: &Path) -> Result<RuntimeConfig, ShellError> {
    if !path.exists() {
        return Err(ShellError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|err| {
        ShellError::Config(format!("failed to read config {}: {err}", path.display()))
    })?;
    if content.trim().is_empty() {
        fs::write(path, default_config_template()).map_err(|err| {
            ShellError::Config(format!(
                "failed to write default config {}: {err}",
                path.display()
            ))
        })?;
        tracing::info!(path = %path.display(), "config.lua was empty; wrote default config");
    }

    let values = load_lua_values(path)?;
    parse_values(&values)
}

/// Builds a config from the flattened `dotted.key=value` pairs the loader
/// script prints.
pub fn parse_values(values: &HashMap<String, String>) -> Result<RuntimeConfig, ShellError> {
    let mut config = RuntimeConfig::default();

    for key in values.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "ignoring unknown config key");
        }
    }

    if let Some(value) = values.get("output") {
        let value = value.trim();
        config.output = (!value.is_empty()).then(|| value.to_owned());
    }

    config.window_list.middle_click_close = parse_bool_flexible(
        values,
        "window_list.middle_click_close",
        config.window_list.middle_click_close,
    )?;

    if let Some(value) = values.get("window_list.orphan_policy") {
        config.window_list.orphan_policy = value.parse::<OrphanPolicy>().map_err(|err| {
            ShellError::Config(format!("invalid value for window_list.orphan_policy: {err}"))
        })?;
    }

    config.ipc.enabled = parse_bool_flexible(values, "ipc.enabled", config.ipc.enabled)?;

    Ok(config)
}

fn config_path() -> Result<PathBuf, ShellError> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg).join("raven-shell").join("config.lua"));
    }

    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join("raven-shell")
            .join("config.lua"));
    }

    Err(ShellError::Config(
        "unable to resolve config path: HOME and XDG_CONFIG_HOME are unset".to_owned(),
    ))
}

fn load_lua_values(path: &Path) -> Result<HashMap<String, String>, ShellError> {
    let output = Command::new("lua")
        .arg("-e")
        .arg(lua_loader_script())
        .env("RAVEN_SHELL_CONFIG_PATH", path)
        .output()
        .map_err(|err| ShellError::Config(format!("failed to execute lua: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let reason = if stderr.is_empty() {
            "lua exited with non-zero status".to_owned()
        } else {
            stderr
        };
        return Err(ShellError::Config(format!(
            "failed to load {}: {reason}",
            path.display()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_key_value_stdout(&stdout)
}

fn parse_key_value_stdout(stdout: &str) -> Result<HashMap<String, String>, ShellError> {
    let mut values = HashMap::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ShellError::Config(format!(
                "invalid lua output line: {line}"
            )));
        };
        values.insert(key.to_owned(), value.to_owned());
    }
    Ok(values)
}

fn parse_bool_flexible(
    values: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ShellError> {
    let Some(raw) = values.get(key) else {
        return Ok(default);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ShellError::Config(format!(
            "invalid value for {key}: {raw} (expected bool or 0/1)"
        ))),
    }
}

fn default_config_template() -> &'static str {
    r#"-- raven-shell config
-- File: ~/.config/raven-shell/config.lua (or $XDG_CONFIG_HOME/raven-shell/config.lua)
return {
  -- Output this shell instance shows windows for (e.g. "eDP-1", "DP-1").
  -- Leave empty to use the first output the compositor announces.
  output = "",

  window_list = {
    -- Close a window when its entry is middle-clicked.
    middle_click_close = false,

    -- What to do with dialogs whose parent closes without reparenting them:
    --   "detach": show them as standalone entries
    --   "adopt":  nest them under the closed window's own parent, if any
    orphan_policy = "detach",
  },

  ipc = {
    -- Serve `raven-shell windows`, `raven-shell click N`, ... over a socket
    -- in $XDG_RUNTIME_DIR.
    enabled = true,
  },
}
"#
}

fn lua_loader_script() -> &'static str {
    r#"
local path = os.getenv("RAVEN_SHELL_CONFIG_PATH")
if type(path) ~= "string" or path == "" then
  io.stderr:write("RAVEN_SHELL_CONFIG_PATH is not set\n")
  os.exit(1)
end

local chunk, load_err = loadfile(path)
if not chunk then
  io.stderr:write(load_err .. "\n")
  os.exit(1)
end

local ok, result = pcall(chunk)
if not ok then
  io.stderr:write(tostring(result) .. "\n")
  os.exit(1)
end

if type(result) ~= "table" then
  if type(_G.config) == "table" then
    result = _G.config
  else
    result = {}
  end
end

local function emit(key, value)
  local text = tostring(value)
  if string.find(text, "\n", 1, true) then
    io.stderr:write(key .. " must not contain newlines\n")
    os.exit(1)
  end
  io.write(key, "=", text, "\n")
end

local function flatten(prefix, value)
  local kind = type(value)
  if kind == "table" then
    local keys = {}
    for key in pairs(value) do
      table.insert(keys, key)
    end
    table.sort(keys, function(a, b) return tostring(a) < tostring(b) end)
    for _, key in ipairs(keys) do
      local name = tostring(key)
      if prefix ~= "" then
        name = prefix .. "." .. name
      end
      flatten(name, value[key])
    end
  elseif kind == "string" or kind == "number" or kind == "boolean" then
    emit(prefix, value)
  else
    io.stderr:write(prefix .. ": unsupported value type " .. kind .. "\n")
    os.exit(1)
  end
end

flatten("", result)
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn empty_values_give_defaults() {
        let config = parse_values(&HashMap::new()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.ipc.enabled);
        assert!(!config.window_list.middle_click_close);
        assert_eq!(config.window_list.orphan_policy, OrphanPolicy::Detach);
    }

    #[test]
    fn values_override_defaults() {
        let config = parse_values(&values(&[
            ("output", " DP-1 "),
            ("window_list.middle_click_close", "yes"),
            ("window_list.orphan_policy", "adopt"),
            ("ipc.enabled", "false"),
        ]))
        .unwrap();

        assert_eq!(config.output.as_deref(), Some("DP-1"));
        assert!(config.window_list.middle_click_close);
        assert_eq!(config.window_list.orphan_policy, OrphanPolicy::Adopt);
        assert!(!config.ipc.enabled);
    }

    #[test]
    fn empty_output_means_any() {
        let config = parse_values(&values(&[("output", "")])).unwrap();
        assert!(config.output.is_none());
        assert!(config.wants_output("HDMI-A-1"));

        let config = parse_values(&values(&[("output", "eDP-1")])).unwrap();
        assert!(config.wants_output("eDP-1"));
        assert!(!config.wants_output("HDMI-A-1"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_values(&values(&[("window_list.middle_click_close", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("window_list.middle_click_close"));

        let err = parse_values(&values(&[("window_list.orphan_policy", "keep")])).unwrap_err();
        assert!(matches!(err, ShellError::Config(_)));
    }

    #[test]
    fn loader_output_is_split_on_first_equals() {
        let parsed = parse_key_value_stdout("output=DP-1\n\nweird=a=b\n").unwrap();
        assert_eq!(parsed.get("output").map(String::as_str), Some("DP-1"));
        assert_eq!(parsed.get("weird").map(String::as_str), Some("a=b"));

        assert!(parse_key_value_stdout("no equals sign").is_err());
    }
}
