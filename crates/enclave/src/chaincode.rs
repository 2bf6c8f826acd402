//! Key-value chaincode run by the simulated enclave.

use std::{ffi::CStr, thread, time::Duration};

use ecc_types::{CallContext, HostCalls};

/// Capacity offered to the host for point reads
pub const MAX_VALUE_SIZE: usize = 4096;

/// Capacity offered to the host for range query results
pub const MAX_RANGE_SIZE: usize = 32 * 1024;

pub(crate) const MSP_ID_SIZE: usize = 128;
pub(crate) const DN_SIZE: usize = 1024;

/// Execute one transaction. `Err` carries the failure message.
pub(crate) fn execute(
    args: &[Vec<u8>],
    host: &dyn HostCalls,
    ctx: CallContext,
) -> Result<Vec<u8>, String> {
    let Some((function, params)) = args.split_first() else {
        return Err("missing function name".into());
    };
    match (function.as_slice(), params) {
        (b"put", [key, value]) => {
            host.put_state(key, value, ctx);
            Ok(b"OK".to_vec())
        }
        (b"get", [key]) => {
            let mut val = vec![0u8; MAX_VALUE_SIZE];
            let mut len = 0;
            host.get_state(key, &mut val, &mut len, ctx);
            val.truncate((len as usize).min(MAX_VALUE_SIZE));
            Ok(val)
        }
        (b"range", [prefix]) => {
            let mut values = vec![0u8; MAX_RANGE_SIZE];
            let mut len = 0;
            host.get_state_by_partial_composite_key(prefix, &mut values, &mut len, ctx);
            values.truncate((len as usize).min(MAX_RANGE_SIZE));
            Ok(values)
        }
        (b"creator", []) => {
            let mut msp_id = [0u8; MSP_ID_SIZE];
            let mut dn = [0u8; DN_SIZE];
            host.get_creator_name(&mut msp_id, &mut dn, ctx);
            let msp_id = c_str(&msp_id);
            let dn = c_str(&dn);
            Ok(format!("{msp_id}\n{dn}").into_bytes())
        }
        (b"sleep", [millis]) => {
            let millis = std::str::from_utf8(millis)
                .ok()
                .and_then(|m| m.parse().ok())
                .ok_or("sleep expects milliseconds")?;
            thread::sleep(Duration::from_millis(millis));
            Ok(b"OK".to_vec())
        }
        (function, _) => Err(format!(
            "unknown function or arity: {}",
            String::from_utf8_lossy(function)
        )),
    }
}

fn c_str(buf: &[u8]) -> String {
    CStr::from_bytes_until_nul(buf)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
