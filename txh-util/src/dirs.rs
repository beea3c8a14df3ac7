use super::constants::TXH_ROOT_DIR;

pub fn get_txh_root_dir() -> std::path::PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(TXH_ROOT_DIR)
    } else {
        std::path::PathBuf::from(".").join(TXH_ROOT_DIR)
    }
}

pub fn get_service_dir(service_name: &str) -> std::path::PathBuf {
    get_txh_root_dir().join(service_name)
}
