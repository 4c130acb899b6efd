// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory data of a Modbus slave

use std::ops::Range;

use crate::frame::{Address, Coil, ExceptionCode, Quantity, Word};

/// The four address spaces of a slave.
///
/// The size of each space is fixed at creation. Addresses are 0-based and
/// every access must lie completely inside its space.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mapping {
    coils: Vec<Coil>,
    discrete_inputs: Vec<Coil>,
    holding_registers: Vec<Word>,
    input_registers: Vec<Word>,
}

fn checked_range(len: usize, addr: Address, cnt: usize) -> Result<Range<usize>, ExceptionCode> {
    let start = usize::from(addr);
    let end = start + cnt;
    if end > len {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(start..end)
}

impl Mapping {
    /// Create a mapping with all coils off and all registers zero.
    #[must_use]
    pub fn new(
        nb_coils: usize,
        nb_discrete_inputs: usize,
        nb_holding_registers: usize,
        nb_input_registers: usize,
    ) -> Self {
        Self {
            coils: vec![false; nb_coils],
            discrete_inputs: vec![false; nb_discrete_inputs],
            holding_registers: vec![0; nb_holding_registers],
            input_registers: vec![0; nb_input_registers],
        }
    }

    #[must_use]
    pub fn coils(&self) -> &[Coil] {
        &self.coils
    }

    pub fn coils_mut(&mut self) -> &mut [Coil] {
        &mut self.coils
    }

    #[must_use]
    pub fn discrete_inputs(&self) -> &[Coil] {
        &self.discrete_inputs
    }

    pub fn discrete_inputs_mut(&mut self) -> &mut [Coil] {
        &mut self.discrete_inputs
    }

    #[must_use]
    pub fn holding_registers(&self) -> &[Word] {
        &self.holding_registers
    }

    pub fn holding_registers_mut(&mut self) -> &mut [Word] {
        &mut self.holding_registers
    }

    #[must_use]
    pub fn input_registers(&self) -> &[Word] {
        &self.input_registers
    }

    pub fn input_registers_mut(&mut self) -> &mut [Word] {
        &mut self.input_registers
    }

    /// # Errors
    ///
    /// [`ExceptionCode::IllegalDataAddress`] if the range exceeds the coils.
    pub fn read_coils(&self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>, ExceptionCode> {
        let range = checked_range(self.coils.len(), addr, cnt.into())?;
        Ok(self.coils[range].to_vec())
    }

    /// # Errors
    ///
    /// [`ExceptionCode::IllegalDataAddress`] if the range exceeds the
    /// discrete inputs.
    pub fn read_discrete_inputs(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Coil>, ExceptionCode> {
        let range = checked_range(self.discrete_inputs.len(), addr, cnt.into())?;
        Ok(self.discrete_inputs[range].to_vec())
    }

    /// # Errors
    ///
    /// [`ExceptionCode::IllegalDataAddress`] if the range exceeds the
    /// holding registers.
    pub fn read_holding_registers(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, ExceptionCode> {
        let range = checked_range(self.holding_registers.len(), addr, cnt.into())?;
        Ok(self.holding_registers[range].to_vec())
    }

    /// # Errors
    ///
    /// [`ExceptionCode::IllegalDataAddress`] if the range exceeds the
    /// input registers.
    pub fn read_input_registers(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> Result<Vec<Word>, ExceptionCode> {
        let range = checked_range(self.input_registers.len(), addr, cnt.into())?;
        Ok(self.input_registers[range].to_vec())
    }

    /// Nothing is written unless all coils fit.
    ///
    /// # Errors
    ///
    /// [`ExceptionCode::IllegalDataAddress`] if the range exceeds the coils.
    pub fn write_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<(), ExceptionCode> {
        let range = checked_range(self.coils.len(), addr, coils.len())?;
        self.coils[range].copy_from_slice(coils);
        Ok(())
    }

    /// Nothing is written unless all registers fit.
    ///
    /// # Errors
    ///
    /// [`ExceptionCode::IllegalDataAddress`] if the range exceeds the
    /// holding registers.
    pub fn write_holding_registers(
        &mut self,
        addr: Address,
        words: &[Word],
    ) -> Result<(), ExceptionCode> {
        let range = checked_range(self.holding_registers.len(), addr, words.len())?;
        self.holding_registers[range].copy_from_slice(words);
        Ok(())
    }
}
