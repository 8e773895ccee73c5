//! インプロセス COM サーバーの登録テーブル。
//!
//! WRL の `Module<InProc>` に相当する。CLSID / ランタイムクラス名から
//! ファクトリ生成子を引き、アンロード可否の参照カウントを保持する。
//! 解決結果はアウトポインタではなくタグ付き `Result` で返す。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};

use windows_core::GUID;

/// アクティベーション解決のエラー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// 要求された CLSID がテーブルに登録されていない。
    ClassNotAvailable(GUID),
    /// 要求されたランタイムクラス名が登録されていない。
    RuntimeClassNotAvailable(String),
    /// ビルド構成で無効化されている操作。
    NotImplemented,
}

impl std::fmt::Display for ActivationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationError::ClassNotAvailable(clsid) => {
                write!(f, "CLSID {clsid:?} はこのサーバーに登録されていない")
            }
            ActivationError::RuntimeClassNotAvailable(name) => {
                write!(f, "ランタイムクラス {name} は登録されていない")
            }
            ActivationError::NotImplemented => {
                write!(f, "この操作はビルド構成で無効化されている")
            }
        }
    }
}

#[cfg(windows)]
impl ActivationError {
    /// 対応する HRESULT へ変換する。
    pub fn hresult(&self) -> windows_core::HRESULT {
        use windows::Win32::Foundation::{CLASS_E_CLASSNOTAVAILABLE, E_NOTIMPL};

        match self {
            ActivationError::ClassNotAvailable(_)
            | ActivationError::RuntimeClassNotAvailable(_) => CLASS_E_CLASSNOTAVAILABLE,
            ActivationError::NotImplemented => E_NOTIMPL,
        }
    }
}

/// プロセス全体で共有される登録テーブル。
///
/// `C` はクラスファクトリ生成子、`A` はアクティベーションファクトリ生成子。
/// DLL 側では fn ポインタを格納し、COM インターフェイスは呼び出しごとに
/// 生成する。全操作は同期・再入可能で、参照カウント以外の状態を変えない。
pub struct InProcModule<C, A> {
    classes: RwLock<Vec<(GUID, C)>>,
    runtime_classes: RwLock<Vec<(String, A)>>,
    objects: AtomicU32,
}

impl<C: Clone, A: Clone> InProcModule<C, A> {
    /// 空のテーブルを作る。クラス未登録の状態ではすべての解決が失敗する。
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(Vec::new()),
            runtime_classes: RwLock::new(Vec::new()),
            objects: AtomicU32::new(0),
        }
    }

    /// CLSID にクラスファクトリ生成子を登録する。既存の登録は置き換える。
    pub fn register_class(&self, clsid: GUID, factory: C) {
        let mut classes = self.classes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = classes.iter_mut().find(|entry| entry.0 == clsid) {
            entry.1 = factory;
        } else {
            classes.push((clsid, factory));
        }
    }

    /// ランタイムクラス名にアクティベーションファクトリ生成子を登録する。
    /// 既存の登録は置き換える。
    pub fn register_runtime_class(&self, name: &str, factory: A) {
        let mut runtime_classes = self
            .runtime_classes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = runtime_classes.iter_mut().find(|entry| entry.0 == name) {
            entry.1 = factory;
        } else {
            runtime_classes.push((name.to_string(), factory));
        }
    }

    /// CLSID からクラスファクトリ生成子を解決する。
    ///
    /// `winrt-strict` ビルドではクラシック COM アクティベーション自体が
    /// 無効化されるため、登録の有無に関わらず失敗する。
    pub fn class_object(&self, clsid: &GUID) -> Result<C, ActivationError> {
        #[cfg(feature = "winrt-strict")]
        {
            let _ = clsid;
            Err(ActivationError::NotImplemented)
        }
        #[cfg(not(feature = "winrt-strict"))]
        {
            let classes = self.classes.read().unwrap_or_else(PoisonError::into_inner);
            classes
                .iter()
                .find(|entry| entry.0 == *clsid)
                .map(|entry| entry.1.clone())
                .ok_or(ActivationError::ClassNotAvailable(*clsid))
        }
    }

    /// ランタイムクラス名からアクティベーションファクトリ生成子を解決する。
    ///
    /// `classic-com` ビルドでは WinRT アクティベーションが無効化されるため、
    /// 登録の有無に関わらず失敗する。
    pub fn activation_factory(&self, name: &str) -> Result<A, ActivationError> {
        #[cfg(feature = "classic-com")]
        {
            let _ = name;
            Err(ActivationError::NotImplemented)
        }
        #[cfg(not(feature = "classic-com"))]
        {
            let runtime_classes = self
                .runtime_classes
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            runtime_classes
                .iter()
                .find(|entry| entry.0 == name)
                .map(|entry| entry.1.clone())
                .ok_or_else(|| ActivationError::RuntimeClassNotAvailable(name.to_string()))
        }
    }

    /// 生存オブジェクト数を増やす。クラス実装のコンストラクタと
    /// `IClassFactory::LockServer(TRUE)` が呼ぶ。
    pub fn increment_object_count(&self) {
        self.objects.fetch_add(1, Ordering::SeqCst);
    }

    /// 生存オブジェクト数を減らす。0 で飽和する。
    pub fn decrement_object_count(&self) {
        let _ = self
            .objects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// 現在の生存オブジェクト数。
    pub fn object_count(&self) -> u32 {
        self.objects.load(Ordering::SeqCst)
    }

    /// DLL をアンロードしてよいか。生存オブジェクトが無ければ true。
    pub fn can_unload(&self) -> bool {
        self.object_count() == 0
    }
}

impl<C: Clone, A: Clone> Default for InProcModule<C, A> {
    fn default() -> Self {
        Self::new()
    }
}
