use std::net::Ipv4Addr;

use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::IpNetwork;

#[cfg(target_os = "linux")]
use linux_impl::{is_physical, is_wireless};
#[cfg(target_os = "macos")]
use macos_impl::{is_physical, is_wireless};
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
use fallback_impl::{is_physical, is_wireless};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    /// The interface was filtered out as "not physical" by the provided logic.
    NotPhysical,
    /// The interface does not support broadcast, so it has no real subnet.
    NotBroadcast,
    /// The interface is a point-to-point link (e.g., a VPN).
    IsPointToPoint,
    /// The interface carries no private IPv4 address.
    NoPrivateIpv4,
}

/// Returns the private IPv4 address of the best LAN interface, wired first.
pub fn lan_ipv4() -> Option<Ipv4Addr> {
    let interfaces: Vec<NetworkInterface> = pnet::datalink::interfaces()
        .into_iter()
        .filter(|intf| is_viable_lan_interface(intf, is_physical).is_ok())
        .collect();

    let interface: NetworkInterface = select_best_lan_interface(interfaces, is_wired)?;
    private_ipv4(&interface)
}

fn private_ipv4(interface: &NetworkInterface) -> Option<Ipv4Addr> {
    interface.ips.iter().find_map(|net| match net {
        IpNetwork::V4(v4) if v4.ip().is_private() => Some(v4.ip()),
        _ => None,
    })
}

fn is_viable_lan_interface(
    interface: &NetworkInterface,
    is_physical: impl Fn(&NetworkInterface) -> bool,
) -> Result<(), ViabilityError> {
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.is_loopback() || !is_physical(interface) {
        return Err(ViabilityError::NotPhysical);
    }
    if !interface.is_broadcast() {
        return Err(ViabilityError::NotBroadcast);
    }
    if interface.is_point_to_point() {
        return Err(ViabilityError::IsPointToPoint);
    }
    if private_ipv4(interface).is_none() {
        return Err(ViabilityError::NoPrivateIpv4);
    }

    Ok(())
}

fn select_best_lan_interface(
    interfaces: Vec<NetworkInterface>,
    is_wired: impl Fn(&NetworkInterface) -> bool,
) -> Option<NetworkInterface> {
    let wired: Option<usize> = interfaces.iter().position(is_wired);
    let idx: usize = wired.unwrap_or(0);
    interfaces.into_iter().nth(idx)
}

fn is_wired(interface: &NetworkInterface) -> bool {
    is_physical(interface) && !is_wireless(interface)
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::path::Path;

    pub fn is_physical(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/device", interface.name)).exists()
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/wireless", interface.name)).exists()
    }
}

#[cfg(target_os = "macos")]
mod macos_impl {
    use super::*;
    use std::collections::HashSet;
    use std::process::Command;
    use std::sync::OnceLock;

    struct HardwareInfo {
        physical_devices: HashSet<String>,
        wireless_devices: HashSet<String>,
    }

    /// Runs `networksetup` once and caches the answer.
    fn get_hardware_info() -> &'static HardwareInfo {
        static HARDWARE_INFO: OnceLock<HardwareInfo> = OnceLock::new();

        HARDWARE_INFO.get_or_init(|| {
            let mut physical = HashSet::new();
            let mut wireless = HashSet::new();

            if let Ok(output) = Command::new("networksetup").arg("-listallhardwareports").output() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                for line in stdout.lines() {
                    if let Some(device) = line.strip_prefix("Device: ") {
                        physical.insert(device.trim().to_string());
                    }
                }
            }

            for device in &physical {
                let is_wifi = Command::new("networksetup")
                    .arg("-getairportnetwork")
                    .arg(device)
                    .output()
                    .map(|out| out.status.success())
                    .unwrap_or(false);

                if is_wifi {
                    wireless.insert(device.clone());
                }
            }

            HardwareInfo {
                physical_devices: physical,
                wireless_devices: wireless,
            }
        })
    }

    pub fn is_physical(interface: &NetworkInterface) -> bool {
        get_hardware_info().physical_devices.contains(&interface.name)
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        get_hardware_info().wireless_devices.contains(&interface.name)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod fallback_impl {
    use super::*;

    pub fn is_physical(_interface: &NetworkInterface) -> bool {
        true
    }

    pub fn is_wireless(_interface: &NetworkInterface) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::util::MacAddr;

    const IFF_UP: u32 = 1;
    const IFF_BROADCAST: u32 = 1 << 1;
    const IFF_LOOPBACK: u32 = 1 << 3;
    const IFF_POINTTOPOINT: u32 = 1 << 4;

    fn mock_interface(name: &str, ips: Vec<IpNetwork>, flags: u32) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: "An interface".to_string(),
            index: 0,
            mac: Some(MacAddr(0x1, 0x2, 0x3, 0x4, 0x5, 0x6)),
            ips,
            flags,
        }
    }

    fn lan_ips() -> Vec<IpNetwork> {
        vec![IpNetwork::V4("192.168.1.100/24".parse().unwrap())]
    }

    fn physical(_: &NetworkInterface) -> bool {
        true
    }

    #[test]
    fn viable_interface_passes() {
        let intf = mock_interface("eth0", lan_ips(), IFF_UP | IFF_BROADCAST);
        assert_eq!(is_viable_lan_interface(&intf, physical), Ok(()));
        assert_eq!(private_ipv4(&intf), Some(Ipv4Addr::new(192, 168, 1, 100)));
    }

    #[test]
    fn down_interface_is_rejected() {
        let intf = mock_interface("wlan0", lan_ips(), IFF_BROADCAST);
        assert_eq!(is_viable_lan_interface(&intf, physical), Err(ViabilityError::IsDown));
    }

    #[test]
    fn loopback_is_rejected() {
        let intf = mock_interface("lo", lan_ips(), IFF_LOOPBACK | IFF_UP | IFF_BROADCAST);
        assert_eq!(is_viable_lan_interface(&intf, physical), Err(ViabilityError::NotPhysical));
    }

    #[test]
    fn point_to_point_is_rejected() {
        let intf = mock_interface("tun0", lan_ips(), IFF_UP | IFF_BROADCAST | IFF_POINTTOPOINT);
        assert_eq!(
            is_viable_lan_interface(&intf, physical),
            Err(ViabilityError::IsPointToPoint)
        );
    }

    #[test]
    fn public_or_ipv6_only_interface_is_rejected() {
        let ips = vec![
            IpNetwork::V4("8.8.8.8/24".parse().unwrap()),
            IpNetwork::V6("fe80::1/64".parse().unwrap()),
        ];
        let intf = mock_interface("eth0", ips, IFF_UP | IFF_BROADCAST);
        assert_eq!(
            is_viable_lan_interface(&intf, physical),
            Err(ViabilityError::NoPrivateIpv4)
        );
    }

    #[test]
    fn wired_interface_is_preferred() {
        let wlan = mock_interface("wlan0", lan_ips(), IFF_UP | IFF_BROADCAST);
        let eth = mock_interface("eth0", lan_ips(), IFF_UP | IFF_BROADCAST);
        let is_wired = |intf: &NetworkInterface| intf.name == "eth0";

        let best = select_best_lan_interface(vec![wlan, eth], is_wired).unwrap();
        assert_eq!(best.name, "eth0");
    }

    #[test]
    fn first_interface_wins_without_wired_option() {
        let wlan = mock_interface("wlan0", lan_ips(), IFF_UP | IFF_BROADCAST);
        let best = select_best_lan_interface(vec![wlan], |_: &NetworkInterface| false).unwrap();
        assert_eq!(best.name, "wlan0");
        assert!(select_best_lan_interface(vec![], |_: &NetworkInterface| false).is_none());
    }
}
