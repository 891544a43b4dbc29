/// Initial register value used for UPDATE.APP partition and header checksums.
pub const UPDATE_APP_INITIAL_SUM: u16 = 0xFFFF;
/// Reflected form of the CCITT polynomial 0x1021.
pub const UPDATE_APP_POLYNOMIAL: u16 = 0x8408;
/// Final XOR applied to the register.
pub const UPDATE_APP_XOR_VALUE: u16 = 0xFFFF;

/// Table-driven, right-shifting (reflected) CRC16.
///
/// The table is derived from the polynomial alone, so two engines built
/// with the same parameters always agree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Crc16 {
    initial_sum: u16,
    polynomial: u16,
    xor_value: u16,
    table: [u16; 256],
}

impl Crc16 {
    pub fn new(initial_sum: u16, polynomial: u16, xor_value: u16) -> Self {
        Self {
            initial_sum,
            polynomial,
            xor_value,
            table: build_table(polynomial),
        }
    }

    /// CRC16/CCITT as used by UPDATE.APP (init 0xFFFF, poly 0x8408, xorout 0xFFFF).
    pub fn update_app() -> Self {
        Self::new(
            UPDATE_APP_INITIAL_SUM,
            UPDATE_APP_POLYNOMIAL,
            UPDATE_APP_XOR_VALUE,
        )
    }

    pub fn initial_sum(&self) -> u16 {
        self.initial_sum
    }

    pub fn polynomial(&self) -> u16 {
        self.polynomial
    }

    pub fn xor_value(&self) -> u16 {
        self.xor_value
    }

    pub fn table(&self) -> &[u16; 256] {
        &self.table
    }

    /// Checksum of `data`, starting from a fresh register.
    pub fn compute_sum(&self, data: &[u8]) -> u16 {
        let mut sum = self.initial_sum;
        for &byte in data {
            sum = (sum >> 8) ^ self.table[((sum ^ byte as u16) & 0xFF) as usize];
        }
        sum ^ self.xor_value
    }
}

fn build_table(polynomial: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    for (byte, entry) in table.iter_mut().enumerate() {
        let mut value: u16 = 0;
        let mut remaining = byte as u16;
        for _ in 0..8 {
            if (value ^ remaining) & 0x0001 != 0 {
                value = (value >> 1) ^ polynomial;
            } else {
                value >>= 1;
            }
            remaining >>= 1;
        }
        *entry = value;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn check_vector_matches_x25() {
        // CRC-16/X-25 (a.k.a. IBM-SDLC) check value.
        let crc = Crc16::update_app();
        assert_eq!(crc.compute_sum(b"123456789"), 0x906E);
    }

    #[test]
    fn empty_input_is_initial_xor_output() {
        let crc = Crc16::update_app();
        assert_eq!(crc.compute_sum(&[]), 0x0000);

        let crc = Crc16::new(0x1234, 0x8408, 0x00FF);
        assert_eq!(crc.compute_sum(&[]), 0x1234 ^ 0x00FF);
    }

    #[test]
    fn table_matches_reflected_ccitt() {
        let crc = Crc16::update_app();
        let table = crc.table();
        assert_eq!(table[0], 0x0000);
        assert_eq!(table[1], 0x1189);
        assert_eq!(table[2], 0x2312);
        assert_eq!(table[0x80], 0x8408);
        assert_eq!(table[0xFF], 0x0F78);
    }

    #[test]
    fn same_parameters_same_table() {
        assert_eq!(Crc16::update_app(), Crc16::new(0xFFFF, 0x8408, 0xFFFF));
        assert_ne!(
            Crc16::new(0xFFFF, 0xA001, 0xFFFF).table(),
            Crc16::update_app().table()
        );
    }

    #[test]
    fn byte_order_matters() {
        let crc = Crc16::update_app();
        assert_ne!(crc.compute_sum(b"ab"), crc.compute_sum(b"ba"));
    }

    proptest! {
        #[test]
        fn compute_sum_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let a = Crc16::update_app();
            let b = Crc16::update_app();
            prop_assert_eq!(a.compute_sum(&data), a.compute_sum(&data));
            prop_assert_eq!(a.compute_sum(&data), b.compute_sum(&data));
        }
    }
}
