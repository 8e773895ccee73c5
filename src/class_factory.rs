//! COM クラスファクトリ。登録テーブル経由で DllGetClassObject から返される。

use windows::Win32::Foundation::*;
use windows::Win32::System::Com::*;
use windows::core::*;

use crate::dll_exports::module;

/// 生成子 fn からインスタンスを作る汎用ファクトリ。
///
/// サーバーに登録する各クラスは `fn() -> Result<IUnknown>` を渡して
/// これを生成子としてテーブルに載せる。
#[implement(IClassFactory)]
pub struct ClassFactory {
    construct: fn() -> Result<IUnknown>,
}

impl ClassFactory {
    pub fn new(construct: fn() -> Result<IUnknown>) -> Self {
        Self { construct }
    }
}

impl IClassFactory_Impl for ClassFactory_Impl {
    fn CreateInstance(
        &self,
        punkouter: Ref<'_, IUnknown>,
        riid: *const GUID,
        ppvobject: *mut *mut core::ffi::c_void,
    ) -> Result<()> {
        if punkouter.is_some() {
            return Err(Error::from_hresult(CLASS_E_NOAGGREGATION));
        }

        let instance = (self.construct)()?;
        unsafe { instance.query(riid, ppvobject).ok() }
    }

    fn LockServer(&self, flock: BOOL) -> Result<()> {
        if flock.as_bool() {
            module().increment_object_count();
        } else {
            module().decrement_object_count();
        }
        Ok(())
    }
}
