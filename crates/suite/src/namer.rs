//! 케이스별 고유 이름 생성
//!
//! 동시에 실행되는 케이스끼리 리소스 이름이 겹치지 않도록 매 실행마다 새 접미사를 만듭니다.
//! 시나리오 빌더는 접미사를 [`BuildContext`](crate::catalog::BuildContext)로만 받습니다.

use std::sync::atomic::{AtomicU64, Ordering};

/// 고유 이름 접미사 생성기
pub trait Namer: Send + Sync {
    /// DNS 레이블로 쓸 수 있는 소문자 영숫자 접미사를 반환합니다.
    fn unique_suffix(&self) -> String;
}

/// UUID v4 기반 접미사 (실행 환경 기본값)
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNamer;

impl Namer for RandomNamer {
    fn unique_suffix(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        id[..10].to_owned()
    }
}

/// 고정 접두어 + 증가 카운터 (재현 가능한 이름이 필요할 때)
#[derive(Debug)]
pub struct SequenceNamer {
    prefix: String,
    next: AtomicU64,
}

impl SequenceNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl Namer for SequenceNamer {
    fn unique_suffix(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        if n == 0 {
            self.prefix.clone()
        } else {
            format!("{}{n}", self.prefix)
        }
    }
}
