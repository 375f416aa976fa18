//! Configuration file support for kszswd.
//!
//! Loads and validates the switch layout, initial tables and daemon
//! settings from TOML. Default location: /etc/kszswd/kszswd.toml

use crate::error::{Result, SwitchError};
use crate::hw::TableWriter;
use crate::port::{BpduFilter, StpState};
use crate::steering::{PortSteering, StaticPortMap};
use crate::switch::{SwitchState, VirtualSwitch};
use crate::tail_tag::{TailTagCodec, TAIL_TAG_MAX_PORTS};
use crate::types::{MacAddress, PortMask, ETH_ZLEN, HOST_PORT, TOTAL_PORT_NUM, VLAN_ID_MAX};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/kszswd/kszswd.toml";

/// Switch layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchSection {
    /// Physical ports, host port included
    #[serde(default = "default_port_count")]
    pub port_count: usize,

    /// Port wired to the host CPU
    #[serde(default = "default_host_port")]
    pub host_port: usize,

    #[serde(default = "default_tail_tagging")]
    pub tail_tagging: bool,

    /// Flush the static address table on topology changes
    #[serde(default)]
    pub fast_aging: bool,

    /// Admit BPDUs on listening and learning ports
    #[serde(default)]
    pub spanning_tree: bool,

    /// Minimum frame length before the tail tag
    #[serde(default = "default_min_frame_len")]
    pub min_frame_len: usize,
}

/// Initial configuration of one port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSection {
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<PortMask>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp_state: Option<StpState>,

    /// Logical device id; defaults to the port index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical: Option<u32>,
}

/// Static address table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticMacSection {
    pub address: MacAddress,

    pub ports: PortMask,

    /// Forwarding domain of this VLAN; takes precedence over `fid`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,

    #[serde(default)]
    pub fid: u16,

    #[serde(default, rename = "override")]
    pub overrides: bool,

    #[serde(default)]
    pub use_fid: bool,
}

/// Static VLAN table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanSection {
    pub vid: u16,

    pub ports: PortMask,

    /// Join the forwarding domain of this earlier VLAN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_with: Option<u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON output; human-readable otherwise
    #[serde(default = "default_log_json")]
    pub json: bool,
}

/// Hardware commit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSection {
    /// Period between commit passes in milliseconds
    #[serde(default = "default_commit_interval")]
    pub interval_ms: u64,
}

/// Complete kszswd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(default)]
    pub switch: SwitchSection,

    #[serde(default, rename = "port")]
    pub ports: Vec<PortSection>,

    #[serde(default, rename = "vlan")]
    pub vlans: Vec<VlanSection>,

    #[serde(default, rename = "static_mac")]
    pub static_macs: Vec<StaticMacSection>,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub commit: CommitSection,
}

fn default_port_count() -> usize {
    TOTAL_PORT_NUM
}

fn default_host_port() -> usize {
    HOST_PORT
}

fn default_tail_tagging() -> bool {
    true
}

fn default_min_frame_len() -> usize {
    ETH_ZLEN
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_json() -> bool {
    true
}

fn default_commit_interval() -> u64 {
    1000
}

impl Default for SwitchSection {
    fn default() -> Self {
        Self {
            port_count: default_port_count(),
            host_port: default_host_port(),
            tail_tagging: default_tail_tagging(),
            fast_aging: false,
            spanning_tree: false,
            min_frame_len: default_min_frame_len(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_log_json(),
        }
    }
}

impl Default for CommitSection {
    fn default() -> Self {
        Self {
            interval_ms: default_commit_interval(),
        }
    }
}

impl SwitchConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                SwitchError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "kszswd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(SwitchError::Io(e)),
        }
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            SwitchError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit.interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let sw = &self.switch;
        let max_ports = if sw.tail_tagging {
            TAIL_TAG_MAX_PORTS
        } else {
            u8::BITS as usize
        };
        if sw.port_count == 0 || sw.port_count > max_ports {
            return Err(config_error(format!(
                "port_count must be 1-{}",
                max_ports
            )));
        }
        if sw.host_port >= sw.port_count {
            return Err(config_error("host_port must be below port_count"));
        }
        if sw.min_frame_len == 0 {
            return Err(config_error("min_frame_len must be > 0"));
        }
        if self.commit.interval_ms == 0 {
            return Err(config_error("commit interval_ms must be > 0"));
        }

        let mut seen = HashSet::new();
        for port in &self.ports {
            if port.index >= sw.port_count {
                return Err(config_error(format!("port {} out of range", port.index)));
            }
            if !seen.insert(port.index) {
                return Err(config_error(format!("port {} configured twice", port.index)));
            }
            if let Some(member) = port.member {
                self.check_mask(member, "port member")?;
            }
        }

        let mut vids = HashSet::new();
        for vlan in &self.vlans {
            if vlan.vid == 0 || vlan.vid > VLAN_ID_MAX {
                return Err(config_error(format!("invalid VLAN id {}", vlan.vid)));
            }
            self.check_mask(vlan.ports, "VLAN ports")?;
            if let Some(other) = vlan.share_with {
                if !vids.contains(&other) {
                    return Err(config_error(format!(
                        "VLAN {} shares with VLAN {} which is not defined before it",
                        vlan.vid, other
                    )));
                }
            }
            if !vids.insert(vlan.vid) {
                return Err(config_error(format!("VLAN {} configured twice", vlan.vid)));
            }
        }

        for mac in &self.static_macs {
            self.check_mask(mac.ports, "static MAC ports")?;
            if let Some(vid) = mac.vlan {
                if !vids.contains(&vid) {
                    return Err(config_error(format!(
                        "static MAC {} refers to unknown VLAN {}",
                        mac.address, vid
                    )));
                }
            }
        }

        Ok(())
    }

    /// Builds a switch with empty tables for this layout.
    pub fn build(&self, writer: Box<dyn TableWriter>) -> Result<VirtualSwitch> {
        self.validate()?;
        let sw = &self.switch;

        let mut state = SwitchState::new(sw.port_count, sw.host_port)?;
        state.set_fast_aging(sw.fast_aging);

        let mut port_map = StaticPortMap::identity(sw.port_count);
        for port in &self.ports {
            if let Some(logical) = port.logical {
                port_map.register(port.index, logical)?;
            }
        }

        // Without tail tags the codec is never used on the wire.
        let codec = TailTagCodec::new(sw.port_count.min(TAIL_TAG_MAX_PORTS))?
            .with_min_frame_len(sw.min_frame_len);

        let mut steering = PortSteering::new(codec, sw.host_port, Arc::new(port_map))
            .with_tail_tagging(sw.tail_tagging);
        if sw.spanning_tree {
            steering = steering.with_spanning_tree(Arc::new(BpduFilter));
        }

        Ok(VirtualSwitch::new(state, writer, steering))
    }

    /// Installs the configured VLANs, ports and static addresses.
    pub fn apply(&self, switch: &VirtualSwitch) -> Result<()> {
        for vlan in &self.vlans {
            match vlan.share_with {
                Some(other) => switch.add_vlan_shared(vlan.vid, vlan.ports, other)?,
                None => switch.add_vlan(vlan.vid, vlan.ports)?,
            };
        }

        for port in &self.ports {
            if let Some(vid) = port.vid {
                switch.set_port_vid(port.index, vid)?;
            }
            if let Some(member) = port.member {
                switch.set_port_member(port.index, member)?;
            }
            if let Some(priority) = port.priority {
                switch.set_port_priority(port.index, priority)?;
            }
            if let Some(stp_state) = port.stp_state {
                switch.set_stp_state(port.index, stp_state)?;
            }
        }

        for mac in &self.static_macs {
            let fid = match mac.vlan {
                Some(vid) => switch.with_state(|state| state.vlans().fid(vid))?,
                None => mac.fid,
            };
            switch.add_static_mac(mac.address, fid, mac.ports, mac.overrides, mac.use_fid)?;
        }

        Ok(())
    }

    fn check_mask(&self, mask: PortMask, what: &str) -> Result<()> {
        if mask.fits(self.switch.port_count) {
            Ok(())
        } else {
            Err(config_error(format!(
                "{} {} names ports beyond port_count {}",
                what, mask, self.switch.port_count
            )))
        }
    }
}

fn config_error(message: impl Into<String>) -> SwitchError {
    SwitchError::Configuration(message.into())
}
