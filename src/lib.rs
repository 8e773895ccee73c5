pub mod module;

#[cfg(windows)]
pub mod class_factory;

// === DLL エクスポート (Windows 専用) ===

#[cfg(windows)]
#[allow(non_snake_case)]
mod dll_exports {
    use std::ffi::c_void;
    use std::mem::ManuallyDrop;
    use std::ptr::null_mut;
    use std::sync::LazyLock;

    use windows::Win32::Foundation::*;
    use windows::Win32::System::Com::IClassFactory;
    use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
    use windows::Win32::System::SystemServices::DLL_PROCESS_ATTACH;
    use windows::Win32::System::WinRT::{IActivationFactory, RoOriginateError};
    use windows::core::*;

    use crate::module::{ActivationError, InProcModule};

    /// クラスファクトリ生成子。登録テーブルに保持される。
    pub type ClassFactoryCreator = fn() -> Result<IClassFactory>;
    /// アクティベーションファクトリ生成子。
    pub type ActivationFactoryCreator = fn() -> Result<IActivationFactory>;

    static MODULE: LazyLock<InProcModule<ClassFactoryCreator, ActivationFactoryCreator>> =
        LazyLock::new(InProcModule::new);

    /// プロセス全体で共有する登録テーブルを返す。
    pub fn module() -> &'static InProcModule<ClassFactoryCreator, ActivationFactoryCreator> {
        &MODULE
    }

    /// 無効化された操作のエラー情報を WinRT 側へ発生させてから HRESULT を返す。
    fn originate(error: &ActivationError) -> HRESULT {
        let hr = error.hresult();
        if *error == ActivationError::NotImplemented {
            unsafe {
                let _ = RoOriginateError(hr, &HSTRING::new());
            }
        }
        hr
    }

    /// DLL ロード時に呼ばれる。プロセスアタッチ時のみ意味を持つ。
    #[unsafe(no_mangle)]
    unsafe extern "system" fn DllMain(
        hinstance: HMODULE,
        reason: u32,
        _reserved: *mut c_void,
    ) -> BOOL {
        if reason == DLL_PROCESS_ATTACH {
            // スレッド単位の attach/detach 通知は使わない
            unsafe {
                let _ = DisableThreadLibraryCalls(hinstance);
            }
        }
        TRUE
    }

    /// DLL がアンロード可能か返す。
    #[unsafe(no_mangle)]
    extern "system" fn DllCanUnloadNow() -> HRESULT {
        if module().can_unload() { S_OK } else { S_FALSE }
    }

    /// 登録テーブルからクラスファクトリを解決して返す。
    #[unsafe(no_mangle)]
    unsafe extern "system" fn DllGetClassObject(
        rclsid: *const GUID,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        if ppv.is_null() {
            return E_POINTER;
        }
        unsafe { *ppv = null_mut() };
        if rclsid.is_null() || riid.is_null() {
            return E_POINTER;
        }

        let clsid = unsafe { &*rclsid };
        match module().class_object(clsid) {
            Ok(create) => match create() {
                Ok(factory) => unsafe { factory.query(riid, ppv) },
                Err(e) => e.code(),
            },
            Err(e) => originate(&e),
        }
    }

    /// COM サーバーをレジストリに登録する。未実装。
    #[unsafe(no_mangle)]
    extern "system" fn DllRegisterServer() -> HRESULT {
        #[cfg(feature = "winrt-strict")]
        {
            originate(&ActivationError::NotImplemented)
        }
        #[cfg(not(feature = "winrt-strict"))]
        {
            E_NOTIMPL
        }
    }

    /// COM サーバーのレジストリ登録を解除する。未実装。
    #[unsafe(no_mangle)]
    extern "system" fn DllUnregisterServer() -> HRESULT {
        #[cfg(feature = "winrt-strict")]
        {
            originate(&ActivationError::NotImplemented)
        }
        #[cfg(not(feature = "winrt-strict"))]
        {
            E_NOTIMPL
        }
    }

    /// ランタイムクラス名からアクティベーションファクトリを解決して返す。
    #[unsafe(no_mangle)]
    unsafe extern "system" fn DllGetActivationFactory(
        activatable_class_id: *mut c_void,
        factory: *mut *mut c_void,
    ) -> HRESULT {
        if factory.is_null() {
            return E_POINTER;
        }
        unsafe { *factory = null_mut() };

        // 呼び出し側所有の HSTRING を借用する
        let class_id = ManuallyDrop::new(unsafe { HSTRING::from_raw(activatable_class_id) });
        match module().activation_factory(&class_id.to_string()) {
            Ok(create) => match create() {
                Ok(activation) => {
                    unsafe { *factory = activation.into_raw() };
                    S_OK
                }
                Err(e) => e.code(),
            },
            Err(e) => originate(&e),
        }
    }

}
