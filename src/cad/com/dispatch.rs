//! `IDispatch` objects and the Windows connector.
//!
//! Every call goes through `GetIDsOfNames` and `Invoke`, the way scripting
//! clients drive the host. Points travel as `VT_ARRAY | VT_R8` variants.

#![allow(unsafe_code)]

use std::time::Duration;

use windows::core::{IUnknown, Interface, BSTR, GUID, HSTRING, PCWSTR, VARIANT};
use windows::Win32::Foundation::{
    RPC_E_CALL_REJECTED, RPC_E_CHANGED_MODE, RPC_E_SERVERCALL_RETRYLATER,
};
use windows::Win32::System::Com::{
    CLSIDFromProgID, CoCreateInstance, CoInitializeEx, IDispatch, CLSCTX_LOCAL_SERVER,
    COINIT_APARTMENTTHREADED, DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET,
    DISPATCH_PROPERTYPUT, DISPPARAMS,
};
use windows::Win32::System::Ole::{GetActiveObject, DISPID_PROPERTYPUT};
use windows::Win32::System::Variant::{
    InitVariantFromDoubleArray, VariantToDoubleArray, VT_ARRAY, VT_BOOL, VT_BSTR, VT_DISPATCH,
    VT_EMPTY, VT_I2, VT_I4, VT_INT, VT_NULL, VT_R4, VT_R8, VT_UI1, VT_UI2, VT_UNKNOWN,
};

use super::{ComSession, Variant};
use crate::cad::error::{CadError, CadResult};
use crate::cad::geometry::Point3;
use crate::cad::host::{Automation, Connector};

/// `LOCALE_USER_DEFAULT`.
const LOCALE: u32 = 0x0400;

fn automation_error(member: &str, error: &windows::core::Error) -> CadError {
    let code = error.code();
    if code == RPC_E_CALL_REJECTED || code == RPC_E_SERVERCALL_RETRYLATER {
        CadError::transient(member, error.to_string())
    } else {
        CadError::rejected(member, error.to_string())
    }
}

/// An automation object reached through `IDispatch`.
#[derive(Debug, Clone)]
pub struct ComObject(IDispatch);

impl ComObject {
    /// Attaches to the running instance registered for `class_id`.
    fn active(class_id: &GUID) -> CadResult<Self> {
        let mut unknown: Option<IUnknown> = None;
        unsafe { GetActiveObject(class_id, None, &mut unknown) }
            .map_err(|e| CadError::not_connected(format!("no running instance: {e}")))?;
        let unknown =
            unknown.ok_or_else(|| CadError::not_connected("no running instance"))?;
        unknown
            .cast::<IDispatch>()
            .map(Self)
            .map_err(|e| CadError::not_connected(format!("instance is not scriptable: {e}")))
    }

    /// Starts a new instance of `class_id` in its own process.
    fn create(class_id: &GUID) -> CadResult<Self> {
        unsafe { CoCreateInstance::<_, IDispatch>(class_id, None, CLSCTX_LOCAL_SERVER) }
            .map(Self)
            .map_err(|e| CadError::not_connected(format!("cannot start the application: {e}")))
    }

    fn dispatch_id(&self, member: &str) -> CadResult<i32> {
        let name: Vec<u16> = member.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(name.as_ptr())];
        let mut id = 0;
        unsafe {
            self.0
                .GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, LOCALE, &mut id)
        }
        .map_err(|e| automation_error(member, &e))?;
        Ok(id)
    }

    fn invoke(
        &self,
        member: &str,
        flags: DISPATCH_FLAGS,
        args: Vec<Variant<Self>>,
    ) -> CadResult<Variant<Self>> {
        let id = self.dispatch_id(member)?;

        // Arguments are passed right to left.
        let mut raw = args
            .into_iter()
            .rev()
            .map(|arg| to_variant(member, arg))
            .collect::<CadResult<Vec<VARIANT>>>()?;
        let count = u32::try_from(raw.len())
            .map_err(|_| CadError::rejected(member, "too many arguments"))?;

        let mut put_id = DISPID_PROPERTYPUT;
        let put = flags == DISPATCH_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: raw.as_mut_ptr(),
            rgdispidNamedArgs: if put {
                &mut put_id
            } else {
                std::ptr::null_mut()
            },
            cArgs: count,
            cNamedArgs: u32::from(put),
        };

        let mut result = VARIANT::default();
        unsafe {
            self.0.Invoke(
                id,
                &GUID::zeroed(),
                LOCALE,
                flags,
                &params,
                Some(&mut result),
                None,
                None,
            )
        }
        .map_err(|e| automation_error(member, &e))?;

        from_variant(member, &result)
    }
}

impl super::Dispatch for ComObject {
    fn get(&self, member: &str) -> CadResult<Variant<Self>> {
        self.invoke(member, DISPATCH_PROPERTYGET, Vec::new())
    }

    fn put(&self, member: &str, value: Variant<Self>) -> CadResult<()> {
        self.invoke(member, DISPATCH_PROPERTYPUT, vec![value]).map(drop)
    }

    fn call(&self, member: &str, args: Vec<Variant<Self>>) -> CadResult<Variant<Self>> {
        self.invoke(member, DISPATCH_METHOD | DISPATCH_PROPERTYGET, args)
    }
}

fn to_variant(member: &str, value: Variant<ComObject>) -> CadResult<VARIANT> {
    Ok(match value {
        Variant::Empty => VARIANT::default(),
        Variant::Bool(v) => VARIANT::from(v),
        Variant::Int(v) => VARIANT::from(v),
        Variant::Real(v) => VARIANT::from(v),
        Variant::Text(s) => VARIANT::from(BSTR::from(s.as_str())),
        Variant::Point(p) => unsafe { InitVariantFromDoubleArray(&[p.x, p.y, p.z]) }
            .map_err(|e| automation_error(member, &e))?,
        Variant::Object(object) => VARIANT::from(
            object
                .0
                .cast::<IUnknown>()
                .map_err(|e| automation_error(member, &e))?,
        ),
    })
}

fn from_variant(member: &str, value: &VARIANT) -> CadResult<Variant<ComObject>> {
    let vt = unsafe { value.as_raw().Anonymous.Anonymous.vt };
    let fail = |e: windows::core::Error| automation_error(member, &e);

    let converted = match vt {
        t if t == VT_EMPTY.0 || t == VT_NULL.0 => Variant::Empty,
        t if t == VT_BOOL.0 => Variant::Bool(bool::try_from(value).map_err(fail)?),
        t if [VT_I2.0, VT_I4.0, VT_INT.0, VT_UI1.0, VT_UI2.0].contains(&t) => {
            Variant::Int(i32::try_from(value).map_err(fail)?)
        }
        t if t == VT_R4.0 || t == VT_R8.0 => Variant::Real(f64::try_from(value).map_err(fail)?),
        t if t == VT_BSTR.0 => Variant::Text(BSTR::try_from(value).map_err(fail)?.to_string()),
        t if t == VT_DISPATCH.0 || t == VT_UNKNOWN.0 => {
            let unknown = IUnknown::try_from(value).map_err(fail)?;
            Variant::Object(ComObject(unknown.cast::<IDispatch>().map_err(fail)?))
        }
        t if t == VT_ARRAY.0 | VT_R8.0 => {
            let mut coordinates = [0.0_f64; 3];
            let mut count = 0_u32;
            unsafe { VariantToDoubleArray(value, &mut coordinates, &mut count) }
                .map_err(fail)?;
            if count < 2 {
                return Err(CadError::rejected(member, "point has fewer than two coordinates"));
            }
            Variant::Point(Point3::new(coordinates[0], coordinates[1], coordinates[2]))
        }
        other => {
            tracing::debug!(member, vt = other, "Unsupported variant type");
            Variant::Empty
        }
    };
    Ok(converted)
}

/// Initialises COM for the calling thread. A thread already initialised in
/// another apartment model is accepted.
fn initialise() -> CadResult<()> {
    match unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok() {
        Ok(()) => Ok(()),
        Err(e) if e.code() == RPC_E_CHANGED_MODE => Ok(()),
        Err(e) => Err(CadError::not_connected(format!("COM is unavailable: {e}"))),
    }
}

/// Connects to the host application over COM.
///
/// A running instance is attached to first. Otherwise a new instance is
/// started, given time to initialise, and a new document is added.
#[derive(Debug, Clone)]
pub struct ComConnector {
    prog_id: String,
    startup: Duration,
}

impl ComConnector {
    /// Creates a connector for the application registered as `prog_id`.
    #[must_use]
    pub fn new(prog_id: impl Into<String>, startup: Duration) -> Self {
        Self {
            prog_id: prog_id.into(),
            startup,
        }
    }
}

impl Connector for ComConnector {
    fn connect(&self) -> CadResult<Box<dyn Automation>> {
        initialise()?;
        let class_id = unsafe { CLSIDFromProgID(&HSTRING::from(self.prog_id.as_str())) }
            .map_err(|e| {
                CadError::not_connected(format!("{} is not registered: {e}", self.prog_id))
            })?;

        match ComObject::active(&class_id).and_then(ComSession::attach) {
            Ok(session) => return Ok(Box::new(session)),
            Err(e) => tracing::info!(
                prog_id = %self.prog_id,
                error = %e,
                "No running instance to attach to, starting one"
            ),
        }

        let application = ComObject::create(&class_id)?;
        let session = ComSession::launch(application, self.startup)?;
        Ok(Box::new(session))
    }
}
