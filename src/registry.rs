use crate::{Config, Error, Tracee};
use crate::error::Violation;
use log::{debug, warn};
use nix::unistd::Pid;
use std::collections::HashMap;

/// The registry is the collection of processes that are currently being traced.
#[derive(Debug)]
pub struct Registry {
    tracees: HashMap<Pid, Tracee>,
    config: Config,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Registry {
    /// Construct a new registry. The first tracee without a parent starts from `config`.
    pub fn new(config: Config) -> Self {
        Self {
            tracees: HashMap::new(),
            config,
        }
    }

    /// Returns the configuration the first tracee starts from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the number of registered tracees.
    pub fn len(&self) -> usize {
        self.tracees.len()
    }

    /// Returns true if no process is being traced.
    pub fn is_empty(&self) -> bool {
        self.tracees.is_empty()
    }

    /// Returns true if `pid` is registered.
    pub fn contains(&self, pid: Pid) -> bool {
        self.tracees.contains_key(&pid)
    }

    /// Iterates over the registered tracees in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Tracee> {
        self.tracees.values()
    }

    /// Returns the tracee for `pid`, registering a new, uninitialized one if there is none yet.
    pub fn get_or_create(&mut self, pid: Pid) -> Result<&mut Tracee, Error> {
        if !self.tracees.contains_key(&pid) {
            if let Err(e) = self.tracees.try_reserve(1) {
                warn!("unable to allocate tracee {pid}: {e}");
                return Err(e.into());
            }

            debug!("tracking tracee {pid}");
        }

        Ok(self.tracees.entry(pid).or_insert_with(|| Tracee::new(pid)))
    }

    /// Returns the tracee for `pid`, if registered.
    pub fn lookup(&self, pid: Pid) -> Option<&Tracee> {
        self.tracees.get(&pid)
    }

    /// Returns the tracee for `pid`, if registered.
    pub fn lookup_mut(&mut self, pid: Pid) -> Option<&mut Tracee> {
        self.tracees.get_mut(&pid)
    }

    /// Initializes the filesystem information of `child` from `parent`, or from the configuration
    /// if the child was launched by the sandbox itself. See [`Tracee`] for which fields are
    /// shared and which are copied.
    ///
    /// Both tracees have to be registered and the parent has to be initialized. On error the
    /// child stays uninitialized.
    pub fn inherit_fs_info(&mut self, child: Pid, parent: Option<Pid>) -> Result<(), Error> {
        if parent == Some(child) {
            return Err(Violation::SelfParent(child).into());
        }

        let mut tracee = match self.tracees.remove(&child) {
            Some(tracee) => tracee,
            None => return Err(Violation::UnknownTracee(child).into()),
        };

        let result = match parent {
            Some(pid) => match self.tracees.get_mut(&pid) {
                Some(parent) => tracee.inherit_from(Some(parent), &self.config),
                None => Err(Violation::UnknownTracee(pid).into()),
            },
            None => tracee.inherit_from(None, &self.config),
        };

        if let Err(Error::ResourceExhaustion(e)) = &result {
            warn!("unable to initialize tracee {child}: {e}");
        }

        self.tracees.insert(child, tracee);

        result
    }

    /// Stops tracking `pid` and releases its filesystem information. Paths shared with other
    /// tracees stay alive until their last holder is deleted.
    pub fn delete(&mut self, pid: Pid) -> Result<(), Error> {
        match self.tracees.remove(&pid) {
            Some(tracee) => {
                debug!("released tracee {pid}");
                drop(tracee);

                Ok(())
            }
            None => Err(Violation::UnknownTracee(pid).into()),
        }
    }

    /// Deletes every registered tracee.
    pub fn delete_all(&mut self) {
        if self.tracees.is_empty() {
            return;
        }

        debug!("releasing {} tracees", self.tracees.len());
        self.tracees.clear();
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.delete_all();
    }
}
