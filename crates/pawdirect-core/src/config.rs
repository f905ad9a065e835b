//! 应用配置和持久化
//!
//! 提供设备名称、下载目录、传输端口等设置的存储和读取。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::transfer::TRANSFER_PORT;

/// 应用设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// 设备名称（广播记录里显示）
    pub device_name: String,
    /// 文件接收目录
    pub download_dir: PathBuf,
    /// 传输端口
    pub transfer_port: u16,
    /// 组主意向提示 (0-15)
    pub group_owner_intent: Option<u8>,
    /// 文件接收成功后是否发出媒体库通知
    pub notify_on_receive: bool,
    /// 详细日志模式
    pub verbose: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device_name: get_default_device_name(),
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            transfer_port: TRANSFER_PORT,
            group_owner_intent: None,
            notify_on_receive: false,
            verbose: false,
        }
    }
}

impl AppSettings {
    /// 获取配置文件路径
    fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pawdirect");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 加载设置；配置文件不存在时写出默认值，方便用户编辑
    pub fn load_or_init() -> Self {
        let settings = Self::load();
        let path = Self::config_path();
        if !path.exists() {
            if let Err(e) = settings.save() {
                log::warn!("Failed to write default settings: {}", e);
            }
        }
        settings
    }

    /// 保存设置
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::config_path())
    }

    /// 保存设置到指定路径
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }
}

/// 获取默认设备名称（主机名）
fn get_default_device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "Pawdirect".to_string())
}
