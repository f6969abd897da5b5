use std::rc::Rc;

/// One stored macro: a name and its raw source bytes. There is no parsed
/// representation; calling a macro means pointing the cursor at `body`.
#[derive(Debug, Clone)]
pub struct MacroEntry {
    pub name: String,
    pub body: Rc<str>,
}

/// Persistent macro store, the host-side stand-in for byte-addressable
/// script storage. Addresses are slab slots and stay stable across erases,
/// so a scheduled task keeps a valid address until its macro is removed.
pub struct MacroStore {
    entries: Vec<Option<MacroEntry>>,
}

impl MacroStore {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Address of the macro with the given name, if defined.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|entry| entry.name == name))
    }

    /// Source bytes stored at an address.
    pub fn source(&self, addr: usize) -> Option<Rc<str>> {
        self.entries
            .get(addr)
            .and_then(|slot| slot.as_ref())
            .map(|entry| Rc::clone(&entry.body))
    }

    pub fn name(&self, addr: usize) -> Option<&str> {
        self.entries
            .get(addr)
            .and_then(|slot| slot.as_ref())
            .map(|entry| entry.name.as_str())
    }

    /// Define or redefine a macro; redefinition keeps the address.
    pub fn define(&mut self, name: &str, body: &str) -> usize {
        let entry = MacroEntry {
            name: name.to_string(),
            body: Rc::from(body),
        };
        if let Some(addr) = self.lookup(name) {
            self.entries[addr] = Some(entry);
            return addr;
        }
        if let Some(addr) = self.entries.iter().position(|slot| slot.is_none()) {
            self.entries[addr] = Some(entry);
            addr
        } else {
            self.entries.push(Some(entry));
            self.entries.len() - 1
        }
    }

    pub fn erase(&mut self, name: &str) -> bool {
        match self.lookup(name) {
            Some(addr) => {
                self.entries[addr] = None;
                true
            }
            None => false,
        }
    }

    pub fn erase_all(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &MacroEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(addr, slot)| slot.as_ref().map(|entry| (addr, entry)))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
