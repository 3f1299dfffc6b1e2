//! Domain models for devices attached to an instance.
//!
//! A device is a closed tagged union over the kinds the remote API knows. The
//! serde representation is the flat attribute map the API expects, tagged by
//! `dev_type` (e.g. `{"dev_type": "DISK", "source": "/src", ...}`).

use crate::core::domain::value_object::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One desired or observed device, with its identity if known.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceSpec {
    /// Remote identity; `None` until the server assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<DeviceIdentity>,
    /// Kind-specific attributes.
    pub device: Device,
}

impl DeviceSpec {
    /// A device whose identity will be assigned by the server.
    pub fn unnamed(device: Device) -> Self {
        Self {
            identity: None,
            device,
        }
    }

    /// A device with a caller-supplied or already known identity.
    pub fn named(identity: DeviceIdentity, device: Device) -> Self {
        Self {
            identity: Some(identity),
            device,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.device.kind()
    }

    /// Returns the identity for log and error messages.
    pub(crate) fn identity_label(&self) -> String {
        self.identity
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

/// Device kinds, in the order the reconciler processes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Disk,
    Nic,
    Proxy,
    Pci,
    Usb,
    Cdrom,
    Raw,
    Display,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 8] = [
        DeviceKind::Disk,
        DeviceKind::Nic,
        DeviceKind::Proxy,
        DeviceKind::Pci,
        DeviceKind::Usb,
        DeviceKind::Cdrom,
        DeviceKind::Raw,
        DeviceKind::Display,
    ];

    /// The remote `dev_type` tag.
    #[must_use]
    pub fn dev_type(self) -> &'static str {
        match self {
            DeviceKind::Disk => "DISK",
            DeviceKind::Nic => "NIC",
            DeviceKind::Proxy => "PROXY",
            DeviceKind::Pci => "PCI",
            DeviceKind::Usb => "USB",
            DeviceKind::Cdrom => "CDROM",
            DeviceKind::Raw => "RAW",
            DeviceKind::Display => "DISPLAY",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dev_type())
    }
}

/// Kind-specific device attributes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "dev_type", rename_all = "UPPERCASE")]
pub enum Device {
    Disk(DiskDevice),
    Nic(NicDevice),
    Proxy(ProxyDevice),
    Pci(PciDevice),
    Usb(UsbDevice),
    Cdrom(CdromDevice),
    Raw(RawDevice),
    Display(DisplayDevice),
}

/// A host path or volume mounted into the instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct DiskDevice {
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub readonly: bool,
}

/// NIC attachment style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NicType {
    Bridged,
    Macvlan,
}

/// A network interface, attached either to a managed network or a parent
/// host interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct NicDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_type: Option<NicType>,
    /// Generated by the server when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A port forward from the host into the instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProxyDevice {
    pub source_proto: Protocol,
    pub source_port: u16,
    pub dest_proto: Protocol,
    pub dest_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct PciDevice {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct UsbDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct CdromDevice {
    #[serde(default)]
    pub path: String,
}

/// A raw image file exposed as a block device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct RawDevice {
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub boot: bool,
}

/// A remote display (SPICE/VNC-style).
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct DisplayDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Allocated by the server when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub web: bool,
    /// Write-only; never echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// The attributes used to pair an unnamed desired device with an observed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKey {
    Disk {
        source: String,
        destination: Option<String>,
    },
    NicNetwork(String),
    NicParent(String),
    Proxy(Protocol, u16, Protocol, u16),
    Pci(String),
    Usb(Option<String>, Option<String>),
    Cdrom(String),
    Raw(String),
    Display(Option<String>, Option<u16>),
}

impl Device {
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Disk(_) => DeviceKind::Disk,
            Device::Nic(_) => DeviceKind::Nic,
            Device::Proxy(_) => DeviceKind::Proxy,
            Device::Pci(_) => DeviceKind::Pci,
            Device::Usb(_) => DeviceKind::Usb,
            Device::Cdrom(_) => DeviceKind::Cdrom,
            Device::Raw(_) => DeviceKind::Raw,
            Device::Display(_) => DeviceKind::Display,
        }
    }

    /// Returns true if a remote update is needed to turn `observed` into `self`.
    ///
    /// Only the kind's comparable attributes are checked. Attributes the server
    /// fills in when left unset (NIC parent, type and MAC address, display
    /// resolution, bind address and port, raw size, USB coordinates) are only
    /// compared when this desired device sets them.
    #[must_use]
    pub fn differs_from(&self, observed: &Device) -> bool {
        match (self, observed) {
            (Device::Disk(want), Device::Disk(have)) => {
                want.source != have.source
                    || want.destination != have.destination
                    || want.readonly != have.readonly
            }
            (Device::Nic(want), Device::Nic(have)) => {
                want.network != have.network
                    || set_and_differs(&want.parent, &have.parent)
                    || set_and_differs(&want.nic_type, &have.nic_type)
                    || set_and_differs(&want.mac, &have.mac)
            }
            (Device::Proxy(want), Device::Proxy(have)) => want != have,
            (Device::Pci(want), Device::Pci(have)) => want.address != have.address,
            (Device::Usb(want), Device::Usb(have)) => {
                set_and_differs(&want.vendor_id, &have.vendor_id)
                    || set_and_differs(&want.product_id, &have.product_id)
                    || set_and_differs(&want.bus, &have.bus)
                    || set_and_differs(&want.dev, &have.dev)
            }
            (Device::Cdrom(want), Device::Cdrom(have)) => want.path != have.path,
            (Device::Raw(want), Device::Raw(have)) => {
                want.path != have.path
                    || want.boot != have.boot
                    || set_and_differs(&want.size, &have.size)
            }
            (Device::Display(want), Device::Display(have)) => {
                set_and_differs(&want.resolution, &have.resolution)
                    || set_and_differs(&want.bind, &have.bind)
                    || want.web != have.web
                    || set_and_differs(&want.port, &have.port)
            }
            _ => true,
        }
    }

    /// Returns the key used by the identity matcher.
    ///
    /// A NIC matches on its network when one is set and on its parent
    /// interface otherwise; a NIC with neither has no key.
    #[must_use]
    pub fn match_key(&self) -> Option<MatchKey> {
        let key = match self {
            Device::Disk(d) => MatchKey::Disk {
                source: d.source.clone(),
                destination: d.destination.clone(),
            },
            Device::Nic(n) => match (&n.network, &n.parent) {
                (Some(network), _) => MatchKey::NicNetwork(network.clone()),
                (None, Some(parent)) => MatchKey::NicParent(parent.clone()),
                (None, None) => return None,
            },
            Device::Proxy(p) => {
                MatchKey::Proxy(p.source_proto, p.source_port, p.dest_proto, p.dest_port)
            }
            Device::Pci(p) => MatchKey::Pci(p.address.clone()),
            Device::Usb(u) => MatchKey::Usb(u.vendor_id.clone(), u.product_id.clone()),
            Device::Cdrom(c) => MatchKey::Cdrom(c.path.clone()),
            Device::Raw(r) => MatchKey::Raw(r.path.clone()),
            Device::Display(d) => MatchKey::Display(d.bind.clone(), d.port),
        };
        Some(key)
    }
}

fn set_and_differs<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
    want.is_some() && want != have
}
