//! Utilities for fabricating DBD byte streams in tests.

/// Splits `data` into LZ4 block frames with 2-byte big-endian length
/// prefixes. Chunks are kept well under the 65,536-byte frame bound.
pub(crate) fn lz4_frames(data: &[u8]) -> Vec<u8> {
    let mut framed = Vec::new();
    for chunk in data.chunks(32 * 1024) {
        let compressed = lz4_flex::block::compress(chunk);
        framed.extend_from_slice(&(compressed.len() as u16).to_be_bytes());
        framed.extend_from_slice(&compressed);
    }
    framed
}

/// Builds a valid 16-byte known-bytes block in the requested byte order.
pub(crate) fn known_bytes_block(big_endian: bool) -> [u8; 16] {
    let mut block = [0u8; 16];
    block[0] = b's';
    block[1] = b'a';
    if big_endian {
        block[2..4].copy_from_slice(&0x1234i16.to_be_bytes());
        block[4..8].copy_from_slice(&123.456f32.to_be_bytes());
        block[8..16].copy_from_slice(&123_456_789.123_45f64.to_be_bytes());
    } else {
        block[2..4].copy_from_slice(&0x1234i16.to_le_bytes());
        block[4..8].copy_from_slice(&123.456f32.to_le_bytes());
        block[8..16].copy_from_slice(&123_456_789.123_45f64.to_le_bytes());
    }
    block
}

/// Packs one 2-bit code per sensor into header-bit bytes, 4 codes per byte
/// from the most-significant pair down.
pub(crate) fn pack_codes(codes: &[u8]) -> Vec<u8> {
    let mut bits = vec![0u8; (codes.len() + 3) / 4];
    for (i, &code) in codes.iter().enumerate() {
        bits[i >> 2] |= (code & 0x3) << (6 - ((i & 0x3) << 1));
    }
    bits
}

/// Declarative builder for a complete DBD byte stream: header, sensor list
/// (inline or factored away), known bytes, and data records.
#[derive(Clone)]
pub(crate) struct FileBuilder {
    mission: String,
    crc: String,
    factored: bool,
    sensors: Vec<(bool, u8, String)>,
    data: Vec<u8>,
    end_tag: bool,
}

impl FileBuilder {
    pub(crate) fn new() -> Self {
        Self {
            mission: "MICRO.MI".to_owned(),
            crc: "DEADBEEF".to_owned(),
            factored: false,
            sensors: Vec::new(),
            data: Vec::new(),
            end_tag: true,
        }
    }

    pub(crate) fn mission(mut self, mission: &str) -> Self {
        self.mission = mission.to_owned();
        self
    }

    pub(crate) fn crc(mut self, crc: &str) -> Self {
        self.crc = crc.to_owned();
        self
    }

    pub(crate) fn factored(mut self, factored: bool) -> Self {
        self.factored = factored;
        self
    }

    /// Adds an available (`T`) sensor of the given size.
    pub(crate) fn sensor(mut self, name: &str, size: u8) -> Self {
        self.sensors.push((true, size, name.to_owned()));
        self
    }

    /// Adds an unavailable (`F`) sensor of the given size.
    pub(crate) fn absent_sensor(mut self, name: &str, size: u8) -> Self {
        self.sensors.push((false, size, name.to_owned()));
        self
    }

    /// Appends one data record: `codes` holds one 2-bit code per *available*
    /// sensor; `payload` holds the concatenated values of the `code == 2`
    /// sensors.
    pub(crate) fn record(mut self, codes: &[u8], payload: &[u8]) -> Self {
        let n_available = self.sensors.iter().filter(|(a, ..)| *a).count();
        assert_eq!(codes.len(), n_available, "one code per available sensor");
        self.data.push(b'd');
        self.data.extend_from_slice(&pack_codes(codes));
        self.data.extend_from_slice(payload);
        self
    }

    /// Appends arbitrary bytes to the data section.
    pub(crate) fn raw_data(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Leaves the terminating `'X'` off the data section.
    pub(crate) fn no_end_tag(mut self) -> Self {
        self.end_tag = false;
        self
    }

    /// Renders the inline sensor definition lines.
    fn sensor_list(&self) -> String {
        let mut lines = String::new();
        let mut storage = 0;
        for (i, (available, size, name)) in self.sensors.iter().enumerate() {
            let (flag, storage_index) = if *available {
                storage += 1;
                ("T", (storage - 1).to_string())
            } else {
                ("F", "-1".to_owned())
            };
            lines.push_str(&format!("s: {flag} {i} {storage_index} {size} {name} nodim\n"));
        }
        lines
    }

    /// Renders the complete file.
    pub(crate) fn build(&self) -> Vec<u8> {
        let n_available = self.sensors.iter().filter(|(a, ..)| *a).count();
        let mut out = format!(
            "dbd_label: DBD(dinkum_binary_data)file\n\
             encoding_ver: 5\n\
             num_ascii_tags: 11\n\
             the8x3_filename: 01230000\n\
             filename_extension: dbd\n\
             mission_name: {}\n\
             fileopen_time: Thu_Feb_29_22:52:07_2024\n\
             total_num_sensors: {}\n\
             sensors_per_cycle: {}\n\
             sensor_list_crc: {}\n\
             sensor_list_factored: {}\n",
            self.mission,
            self.sensors.len(),
            n_available,
            self.crc,
            i32::from(self.factored),
        )
        .into_bytes();
        if !self.factored {
            out.extend_from_slice(self.sensor_list().as_bytes());
        }
        out.extend_from_slice(&known_bytes_block(false));
        out.extend_from_slice(&self.data);
        if self.end_tag {
            out.push(b'X');
        }
        out
    }

    /// Renders the complete file as an LZ4-framed stream.
    pub(crate) fn build_compressed(&self) -> Vec<u8> {
        lz4_frames(&self.build())
    }
}
