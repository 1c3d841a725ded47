const DEFAULT_DRIVER: &str = "monitord";

pub fn get_default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

const CONFIG_PATH: &str = "HOST_MONITOR_CONFIG";

pub fn get_config_path() -> Option<String> {
    std::env::var(CONFIG_PATH).ok()
}
