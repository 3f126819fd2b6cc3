use std::fmt;

use vswitch_backend::{Operation, Version};

const REFRESH_KEY: &str = "f";
const CLOSE_KEY: &str = "q";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    SwitchVersion(Version),
    /// `index` refers to the process list the menu was built from.
    Process {
        index: usize,
        operation: Operation,
    },
    Refresh,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub key: String,
    pub label: String,
    pub checked: bool,
    pub enabled: bool,
    pub command: MenuCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    Notice(String),
    Header(String),
    Label(String),
    Item(MenuItem),
    Separator,
}

/// Snapshot of one process as shown in the menu. `running` is `None` when
/// its state could not be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus<'a> {
    pub name: &'a str,
    pub group: &'a str,
    pub running: Option<bool>,
}

/// Menu model rebuilt from scratch after every action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Menu {
    entries: Vec<MenuEntry>,
}

impl Menu {
    pub fn build(
        versions: &[Version],
        active: Option<&Version>,
        processes: &[ProcessStatus<'_>],
    ) -> Self {
        let mut entries = Vec::new();

        if versions.is_empty() {
            entries.push(MenuEntry::Notice("No versions installed".to_string()));
        }
        for (i, version) in versions.iter().enumerate() {
            entries.push(MenuEntry::Item(MenuItem {
                key: (i + 1).to_string(),
                label: version.to_string(),
                checked: active == Some(version),
                enabled: true,
                command: MenuCommand::SwitchVersion(version.clone()),
            }));
        }
        entries.push(MenuEntry::Separator);

        let mut groups: Vec<&str> = Vec::new();
        for process in processes {
            if !groups.contains(&process.group) {
                groups.push(process.group);
            }
        }

        for group in &groups {
            entries.push(MenuEntry::Header((*group).to_string()));
            for (index, process) in processes
                .iter()
                .enumerate()
                .filter(|(_, p)| p.group == *group)
            {
                entries.push(MenuEntry::Label(format!(
                    "{}: {}",
                    process.name,
                    match process.running {
                        Some(true) => "running",
                        Some(false) => "stopped",
                        None => "unknown",
                    }
                )));
                entries.extend(process_items(index, process.running));
            }
        }
        if !groups.is_empty() {
            entries.push(MenuEntry::Separator);
        }

        entries.push(MenuEntry::Item(plain_item(
            REFRESH_KEY,
            "Refresh",
            MenuCommand::Refresh,
        )));
        entries.push(MenuEntry::Item(plain_item(
            CLOSE_KEY,
            "Close",
            MenuCommand::Close,
        )));

        Self { entries }
    }

    /// Put a notice above everything else, e.g. a discovery error.
    #[must_use]
    pub fn with_notice(mut self, text: impl Into<String>) -> Self {
        self.entries.insert(0, MenuEntry::Notice(text.into()));
        self
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    /// Command of the enabled item bound to `key`, if any.
    pub fn select(&self, key: &str) -> Option<&MenuCommand> {
        let key = key.trim();
        self.items()
            .find(|item| item.enabled && item.key.eq_ignore_ascii_case(key))
            .map(|item| &item.command)
    }

    fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.entries.iter().filter_map(|entry| match entry {
            MenuEntry::Item(item) => Some(item),
            _ => None,
        })
    }
}

fn plain_item(key: &str, label: &str, command: MenuCommand) -> MenuItem {
    MenuItem {
        key: key.to_string(),
        label: label.to_string(),
        checked: false,
        enabled: true,
        command,
    }
}

fn process_items(index: usize, running: Option<bool>) -> [MenuEntry; 3] {
    let (can_start, can_stop) = match running {
        Some(true) => (false, true),
        Some(false) => (true, false),
        None => (true, true),
    };
    let number = index + 1;

    [
        (Operation::Start, "s", can_start),
        (Operation::Stop, "x", can_stop),
        (Operation::Restart, "r", can_stop),
    ]
    .map(|(operation, prefix, enabled)| {
        MenuEntry::Item(MenuItem {
            key: format!("{prefix}{number}"),
            label: match operation {
                Operation::Start => "Start",
                Operation::Stop => "Stop",
                Operation::Restart => "Restart",
            }
            .to_string(),
            checked: false,
            enabled,
            command: MenuCommand::Process { index, operation },
        })
    })
}

impl fmt::Display for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.entries() {
            match entry {
                MenuEntry::Notice(text) => writeln!(f, "! {text}")?,
                MenuEntry::Header(text) => writeln!(f, "{text}")?,
                MenuEntry::Label(text) => writeln!(f, "  {text}")?,
                MenuEntry::Separator => writeln!(f, "----")?,
                MenuEntry::Item(item) => {
                    let key = if item.enabled {
                        format!("[{}]", item.key)
                    } else {
                        " ".repeat(item.key.len() + 2)
                    };
                    let mark = if item.checked { "*" } else { " " };
                    writeln!(f, "  {key:<5} {mark} {}", item.label)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions() -> Vec<Version> {
        vec![Version::new(8, 1, 27), Version::new(8, 2, 15)]
    }

    fn item<'a>(menu: &'a Menu, key: &str) -> &'a MenuItem {
        menu.items()
            .find(|item| item.key == key)
            .expect("item should exist")
    }

    #[test]
    fn active_version_is_checked() {
        let versions = versions();
        let menu = Menu::build(&versions, Some(&versions[1]), &[]);

        assert!(!item(&menu, "1").checked);
        assert!(item(&menu, "2").checked);
        assert_eq!(
            menu.select("2"),
            Some(&MenuCommand::SwitchVersion(Version::new(8, 2, 15)))
        );
    }

    #[test]
    fn running_process_enables_stop_and_restart() {
        let processes = [ProcessStatus {
            name: "Apache",
            group: "Services",
            running: Some(true),
        }];
        let menu = Menu::build(&versions(), None, &processes);

        assert!(!item(&menu, "s1").enabled);
        assert!(item(&menu, "x1").enabled);
        assert!(item(&menu, "r1").enabled);
        assert_eq!(menu.select("s1"), None);
        assert_eq!(
            menu.select("R1"),
            Some(&MenuCommand::Process {
                index: 0,
                operation: Operation::Restart,
            })
        );
    }

    #[test]
    fn stopped_process_enables_start_only() {
        let processes = [ProcessStatus {
            name: "PHP CGI",
            group: "Executables",
            running: Some(false),
        }];
        let menu = Menu::build(&versions(), None, &processes);

        assert!(item(&menu, "s1").enabled);
        assert!(!item(&menu, "x1").enabled);
        assert!(!item(&menu, "r1").enabled);
    }

    #[test]
    fn unknown_state_enables_everything() {
        let processes = [ProcessStatus {
            name: "nginx",
            group: "Services",
            running: None,
        }];
        let menu = Menu::build(&versions(), None, &processes);

        assert!(item(&menu, "s1").enabled);
        assert!(item(&menu, "x1").enabled);
        assert!(item(&menu, "r1").enabled);
        assert!(menu.to_string().contains("nginx: unknown"));
    }

    #[test]
    fn processes_are_grouped_in_first_seen_order() {
        let processes = [
            ProcessStatus {
                name: "Apache",
                group: "Services",
                running: Some(true),
            },
            ProcessStatus {
                name: "PHP CGI",
                group: "Executables",
                running: Some(false),
            },
            ProcessStatus {
                name: "MySQL",
                group: "Services",
                running: Some(false),
            },
        ];
        let menu = Menu::build(&versions(), None, &processes);

        let layout: Vec<&str> = menu
            .entries()
            .iter()
            .filter_map(|entry| match entry {
                MenuEntry::Header(text) | MenuEntry::Label(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            layout,
            vec![
                "Services",
                "Apache: running",
                "MySQL: stopped",
                "Executables",
                "PHP CGI: stopped",
            ]
        );
        assert_eq!(
            menu.select("s3"),
            Some(&MenuCommand::Process {
                index: 2,
                operation: Operation::Start,
            })
        );
    }

    #[test]
    fn refresh_and_close_come_last() {
        let menu = Menu::build(&[], None, &[]);

        let tail: Vec<&MenuEntry> = menu.entries().iter().rev().take(2).collect();
        assert!(matches!(tail[0], MenuEntry::Item(MenuItem { command: MenuCommand::Close, .. })));
        assert!(matches!(tail[1], MenuEntry::Item(MenuItem { command: MenuCommand::Refresh, .. })));
        assert_eq!(
            menu.entries()[0],
            MenuEntry::Notice("No versions installed".to_string())
        );
    }

    #[test]
    fn notice_goes_first_and_unknown_keys_select_nothing() {
        let menu = Menu::build(&versions(), None, &[]).with_notice("Unable to read /opt/php");

        assert_eq!(
            menu.entries()[0],
            MenuEntry::Notice("Unable to read /opt/php".to_string())
        );
        assert_eq!(menu.select("9"), None);
        assert_eq!(menu.select(" q "), Some(&MenuCommand::Close));
    }

    #[test]
    fn rendering_hides_keys_of_disabled_items() {
        let processes = [ProcessStatus {
            name: "Apache",
            group: "Services",
            running: Some(false),
        }];
        let rendered = Menu::build(&versions(), Some(&Version::new(8, 1, 27)), &processes)
            .to_string();

        assert!(rendered.contains("[1]   * 8.1.27"));
        assert!(rendered.contains("[s1]    Start"));
        assert!(!rendered.contains("[x1]"));
        assert!(rendered.contains("[q]     Close"));
    }
}
