//! Slot sizes of field and method descriptors (JVMS §4.3).

/// The number of local variable or operand stack slots a value of the given
/// field type occupies. `V` takes none.
fn type_slots(c: u8) -> u16 {
    match c {
        b'J' | b'D' => 2,
        b'V' => 0,
        _ => 1,
    }
}

/// Slots taken by a field of descriptor `descriptor`.
pub fn field_slots(descriptor: &str) -> Option<u16> {
    descriptor.bytes().next().map(type_slots)
}

/// Returns `(argument slots, return slots)` of a method descriptor, or `None`
/// if the descriptor is malformed.
pub fn method_slots(descriptor: &str) -> Option<(u16, u16)> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return None;
    }
    let mut args = 0;
    let mut i = 1;
    loop {
        match *bytes.get(i)? {
            b')' => break,
            b'[' => {
                while *bytes.get(i)? == b'[' {
                    i += 1;
                }
                if bytes[i] == b'L' {
                    i += descriptor[i..].find(';')?;
                }
                args += 1;
                i += 1;
            }
            b'L' => {
                i += descriptor[i..].find(';')? + 1;
                args += 1;
            }
            c @ b'B' | c @ b'C' | c @ b'D' | c @ b'F' | c @ b'I' | c @ b'J' | c @ b'S' | c @ b'Z' => {
                args += type_slots(c);
                i += 1;
            }
            _ => return None,
        }
    }
    let ret = *bytes.get(i + 1)?;
    Some((args, type_slots(ret)))
}
