use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::format::{Item, StrftimeItems};
use frameql_error::{DbError, Result, ResultExt};
use serde::{Deserialize, Serialize};

/// Where registered frames live while a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Copy frames into an in-memory database.
    #[default]
    Memory,
    /// Copy frames into a temporary database file.
    File,
    /// Expose frames through a virtual table without copying.
    Pushdown,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
            Self::Pushdown => write!(f, "pushdown"),
        }
    }
}

impl FromStr for StorageMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "memory" => StorageMode::Memory,
            "file" => StorageMode::File,
            "pushdown" => StorageMode::Pushdown,
            other => return Err(DbError::new(format!("Unknown storage mode '{other}'"))),
        })
    }
}

/// Layout used to store datetimes as text inside SQLite.
pub const DEFAULT_SQL_DATETIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

pub const DEFAULT_RESULT_NAME: &str = "result";

/// Configuration for running a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub storage_mode: StorageMode,
    pub insert_batch_size: usize,
    pub registration_workers: usize,
    pub datetime_layout: String,
    pub result_name: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            storage_mode: StorageMode::default(),
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            registration_workers: num_cpus::get().clamp(MIN_WORKERS, MAX_WORKERS),
            datetime_layout: DEFAULT_SQL_DATETIME_LAYOUT.to_string(),
            result_name: DEFAULT_RESULT_NAME.to_string(),
        }
    }
}

impl QueryConfig {
    pub fn with_storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    /// Parse a config from JSON. Missing keys take their default.
    pub fn from_json(s: &str) -> Result<Self> {
        let conf: QueryConfig = serde_json::from_str(s).context("Failed to parse query config")?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check every setting against its allowed range.
    pub fn validate(&self) -> Result<()> {
        InsertBatchSize::validate_value(self.insert_batch_size)?;
        RegistrationWorkers::validate_value(self.registration_workers)?;
        DatetimeLayout::validate_value(&self.datetime_layout)?;
        ResultName::validate_value(&self.result_name)?;
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get(&self, name: &str) -> Result<String> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    /// Reset a single setting to its default.
    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();
        let value = def_conf.get(name)?;
        self.set(name, &value)
    }

    /// Names and descriptions of all settings.
    pub fn settings() -> impl Iterator<Item = (&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings.into_iter()
    }
}

struct SettingFunctions {
    description: &'static str,
    set: fn(value: &str, conf: &mut QueryConfig) -> Result<()>,
    get: fn(conf: &QueryConfig) -> String,
}

impl SettingFunctions {
    const fn new<S: QuerySetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_str as _,
            get: S::get_as_string as _,
        }
    }
}

fn insert_setting<S: QuerySetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<StorageModeSetting>(&mut map);
    insert_setting::<InsertBatchSize>(&mut map);
    insert_setting::<RegistrationWorkers>(&mut map);
    insert_setting::<DatetimeLayout>(&mut map);
    insert_setting::<ResultName>(&mut map);

    map
});

pub trait QuerySetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_str(value: &str, conf: &mut QueryConfig) -> Result<()>;
    fn get_as_string(conf: &QueryConfig) -> String;
}

fn parse_usize(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| DbError::with_source(format!("Invalid value for '{name}'"), Box::new(e)))
}

pub struct StorageModeSetting;

impl QuerySetting for StorageModeSetting {
    const NAME: &'static str = "storage_mode";
    const DESCRIPTION: &'static str = "Where frames are stored while a query runs: memory, file or pushdown";

    fn set_from_str(value: &str, conf: &mut QueryConfig) -> Result<()> {
        conf.storage_mode = value.parse()?;
        Ok(())
    }

    fn get_as_string(conf: &QueryConfig) -> String {
        conf.storage_mode.to_string()
    }
}

const MIN_INSERT_BATCH_SIZE: usize = 1;
const MAX_INSERT_BATCH_SIZE: usize = 10_000;

pub struct InsertBatchSize;

impl InsertBatchSize {
    pub fn validate_value(val: usize) -> Result<()> {
        if val < MIN_INSERT_BATCH_SIZE {
            return Err(DbError::new(format!(
                "Insert batch size cannot be less than {MIN_INSERT_BATCH_SIZE}"
            )));
        }

        if val > MAX_INSERT_BATCH_SIZE {
            return Err(DbError::new(format!(
                "Insert batch size cannot be greater than {MAX_INSERT_BATCH_SIZE}"
            )));
        }

        Ok(())
    }
}

impl QuerySetting for InsertBatchSize {
    const NAME: &'static str = "insert_batch_size";
    const DESCRIPTION: &'static str = "Rows per INSERT statement when materializing frames";

    fn set_from_str(value: &str, conf: &mut QueryConfig) -> Result<()> {
        let val = parse_usize(Self::NAME, value)?;
        Self::validate_value(val)?;
        conf.insert_batch_size = val;
        Ok(())
    }

    fn get_as_string(conf: &QueryConfig) -> String {
        conf.insert_batch_size.to_string()
    }
}

const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 256;

pub struct RegistrationWorkers;

impl RegistrationWorkers {
    pub fn validate_value(val: usize) -> Result<()> {
        if val < MIN_WORKERS {
            return Err(DbError::new(format!(
                "Registration workers cannot be less than {MIN_WORKERS}"
            )));
        }

        if val > MAX_WORKERS {
            return Err(DbError::new(format!(
                "Registration workers cannot be greater than {MAX_WORKERS}"
            )));
        }

        Ok(())
    }
}

impl QuerySetting for RegistrationWorkers {
    const NAME: &'static str = "registration_workers";
    const DESCRIPTION: &'static str = "Number of workers registering frames in parallel";

    fn set_from_str(value: &str, conf: &mut QueryConfig) -> Result<()> {
        let val = parse_usize(Self::NAME, value)?;
        Self::validate_value(val)?;
        conf.registration_workers = val;
        Ok(())
    }

    fn get_as_string(conf: &QueryConfig) -> String {
        conf.registration_workers.to_string()
    }
}

pub struct DatetimeLayout;

impl DatetimeLayout {
    pub fn validate_value(val: &str) -> Result<()> {
        if val.is_empty() {
            return Err(DbError::new("Datetime layout cannot be empty"));
        }
        if StrftimeItems::new(val).any(|item| matches!(item, Item::Error)) {
            return Err(DbError::new(format!("Invalid datetime layout '{val}'")));
        }
        Ok(())
    }
}

impl QuerySetting for DatetimeLayout {
    const NAME: &'static str = "datetime_layout";
    const DESCRIPTION: &'static str = "strftime layout used to store datetimes as text";

    fn set_from_str(value: &str, conf: &mut QueryConfig) -> Result<()> {
        Self::validate_value(value)?;
        conf.datetime_layout = value.to_string();
        Ok(())
    }

    fn get_as_string(conf: &QueryConfig) -> String {
        conf.datetime_layout.clone()
    }
}

pub struct ResultName;

impl ResultName {
    pub fn validate_value(val: &str) -> Result<()> {
        if val.trim().is_empty() {
            return Err(DbError::new("Result name cannot be empty"));
        }
        Ok(())
    }
}

impl QuerySetting for ResultName {
    const NAME: &'static str = "result_name";
    const DESCRIPTION: &'static str = "Name given to the frame returned by a query";

    fn set_from_str(value: &str, conf: &mut QueryConfig) -> Result<()> {
        Self::validate_value(value)?;
        conf.result_name = value.to_string();
        Ok(())
    }

    fn get_as_string(conf: &QueryConfig) -> String {
        conf.result_name.clone()
    }
}
