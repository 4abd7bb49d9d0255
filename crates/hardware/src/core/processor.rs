//! The composed processor: register file + frontend + backend.

use tracing::trace;

use crate::config::SimConfig;
use crate::core::backend::Backend;
use crate::core::frontend::Frontend;
use crate::core::predictor::BranchPredictor;
use crate::core::regfile::RegisterFile;
use crate::stats::MemStats;

/// A single-core RV32IM processor instance.
pub struct Processor {
    regfile: RegisterFile,
    frontend: Frontend,
    backend: Backend,
}

impl Processor {
    /// Builds a processor from the configuration with empty instruction and
    /// data images; call `load_program` before stepping.
    pub fn new(config: &SimConfig) -> Self {
        let predictor = config.frontend.predictor.then(BranchPredictor::new);
        Self {
            regfile: RegisterFile::new(),
            frontend: Frontend::new(&[], predictor),
            backend: Backend::new(config, &[]),
        }
    }

    /// Installs a program and resets all execution state. Register values
    /// are cleared; fetch restarts at `entry`.
    pub fn load_program(&mut self, text: &[u32], data: &[u32], entry: u32) {
        self.frontend.reset(text, entry);
        self.regfile.reset();
        self.backend.reset(data, &mut self.regfile);
    }

    /// Advances one global tick: the backend first, then the frontend's
    /// dispatch attempt. Returns true once EXIT commits.
    pub fn step(&mut self) -> bool {
        let finished = self.backend.step(&mut self.frontend, &mut self.regfile);
        if let Some(inst) = self.frontend.step() {
            if self.backend.dispatch_instruction(inst, &mut self.regfile) {
                trace!("dispatch accepted");
            } else {
                self.frontend.halt_dispatch();
            }
        }
        finished
    }

    /// Harness read of an architectural register.
    pub fn read_reg(&self, r: usize) -> u32 {
        self.regfile.read(r)
    }

    /// Harness write of an architectural register.
    pub fn write_reg(&mut self, r: usize, value: u32) {
        self.regfile.functional_write(r, value);
    }

    /// Harness read of a data-memory word.
    pub fn read_mem(&self, addr: u32) -> u32 {
        self.backend.read(addr)
    }

    /// Harness write of a data-memory word.
    pub fn write_mem(&mut self, addr: u32, value: u32) {
        self.backend.functional_write(addr, value);
    }

    /// Commit-time cache statistics.
    pub fn stats(&self) -> MemStats {
        self.backend.stats()
    }
}
