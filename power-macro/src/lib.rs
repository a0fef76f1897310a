//! # power procedural macros
//!
//! - `#[service]` turns a trait into an RPC service: server-side dispatch,
//!   a client implementation on `power::Client`, and a `power_export`
//!   method that binds it to a `Router`.
//! - `#[grpc_server]` marks a type for discovery and registers it by name.
//! - `#[loadable]` registers a type by name without the discovery marker.
//!
//! ```rust,ignore
//! #[power::service]
//! pub trait HelloService {
//!     async fn hello(&self, ctx: &Context, req: &HelloRequest) -> Result<HelloResponse>;
//! }
//!
//! #[power::grpc_server]
//! #[derive(Default)]
//! pub struct HelloServer;
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, FnArg, ItemTrait, ReturnType, TraitItem, Type, parse_macro_input, parse_quote};

/// Defines an RPC service trait.
///
/// Every method must have the form
/// `async fn method(&self, ctx: &Context, req: &Req) -> Result<Rsp>` and is
/// bound as `"<Trait>/<method>"`. The returned futures are required to be
/// `Send`.
///
/// # Panics
///
/// Panics at compile time if a method does not match that form, has a
/// default body, or is named `power_export` or `power_request`.
#[proc_macro_attribute]
pub fn service(_attr: TokenStream, input: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(input as ItemTrait);

    let trait_ident = input.ident.clone();
    let trait_name = trait_ident.to_string();
    let krate = get_crate_name();

    let mut bindings = vec![];
    let mut client_methods = vec![];

    for item in &mut input.items {
        let TraitItem::Fn(method) = item else {
            panic!("a service trait may only contain methods");
        };
        if method.sig.inputs.len() != 3
            || method.sig.asyncness.is_none()
            || method.sig.receiver().is_none()
            || method.default.is_some()
        {
            panic!(
                "the method should be in the form `async fn method(&self, ctx: &Context, req: &Req) -> Result<Rsp>;`."
            );
        }
        let FnArg::Typed(req_arg) = &method.sig.inputs[2] else {
            panic!("the third argument should be the request");
        };
        let Type::Reference(req_ref) = req_arg.ty.as_ref() else {
            panic!("the request should be taken by reference");
        };
        let ReturnType::Type(_, rsp_type) = &method.sig.output else {
            panic!("the method should return a `Result`");
        };

        let method_ident = method.sig.ident.clone();
        if method_ident == "power_export" || method_ident == "power_request" {
            panic!("the method cannot be named `power_export` or `power_request`!");
        }
        let method_name = format!("{trait_name}/{method_ident}");
        let req_type = req_arg.ty.clone();
        let req_inner = req_ref.elem.clone();
        let rsp_type = rsp_type.clone();

        client_methods.push(quote! {
            async fn #method_ident(&self, ctx: &#krate::Context, req: #req_type) -> #rsp_type {
                self.power_request(ctx, req, #method_name).await
            }
        });

        bindings.push(quote! {
            {
                let this = self.clone();
                router.add_method(
                    #method_name,
                    ::std::boxed::Box::new(
                        move |mut ctx: #krate::Context, msg: #krate::Message| -> #krate::CallFuture {
                            let this = this.clone();
                            ::std::boxed::Box::pin(async move {
                                let meta = msg.meta.clone();
                                match msg.deserialize::<#req_inner>() {
                                    Ok(req) => {
                                        let rsp = this.#method_ident(&ctx, &req).await;
                                        ctx.send_rsp(meta, rsp).await;
                                    }
                                    Err(err) => ctx.send_err_rsp(meta, err).await,
                                }
                            })
                        },
                    ),
                );
            }
        });

        method.sig.asyncness = None;
        method.sig.output = parse_quote! {
            -> impl ::std::future::Future<Output = #rsp_type> + ::std::marker::Send
        };
    }

    let visibility = &input.vis;
    let attrs = &input.attrs;
    let items = &input.items;

    quote! {
        #(#attrs)*
        #visibility trait #trait_ident {
            const NAME: &'static str = #trait_name;

            #(#items)*

            /// Binds every method of this service to `router`.
            fn power_export(
                self: ::std::sync::Arc<Self>,
                router: &mut #krate::Router,
            )
            where
                Self: 'static + ::std::marker::Send + ::std::marker::Sync,
            {
                #(#bindings)*
            }
        }

        impl #trait_ident for #krate::Client {
            #(#client_methods)*
        }
    }
    .into()
}

/// Discovery marker: registers the type under its module path with the
/// marker set. The type must implement `Default`.
#[proc_macro_attribute]
pub fn grpc_server(_attr: TokenStream, input: TokenStream) -> TokenStream {
    register(input, true)
}

/// Registers the type under its module path without the discovery
/// marker. The type must implement `Default`.
#[proc_macro_attribute]
pub fn loadable(_attr: TokenStream, input: TokenStream) -> TokenStream {
    register(input, false)
}

fn register(input: TokenStream, marked: bool) -> TokenStream {
    let item = parse_macro_input!(input as DeriveInput);
    if !item.generics.params.is_empty() {
        return syn::Error::new_spanned(&item.generics, "registered types cannot be generic")
            .to_compile_error()
            .into();
    }

    let krate = get_crate_name();
    let ident = &item.ident;
    let name = ident.to_string();

    quote! {
        #item

        const _: () = {
            fn __power_instantiate() -> #krate::Instance {
                use #krate::__private::{ProbePlain as _, ProbeService as _};
                (&#krate::__private::Probe::<#ident>::new()).instance()
            }

            #krate::__private::inventory::submit! {
                #krate::TypeRegistration {
                    module_path: ::core::module_path!(),
                    ident: #name,
                    marked: #marked,
                    instantiate: __power_instantiate,
                }
            }
        };
    }
    .into()
}

/// Path to the `power` crate as seen from the expansion site.
fn get_crate_name() -> proc_macro2::TokenStream {
    match proc_macro_crate::crate_name("power") {
        Ok(proc_macro_crate::FoundCrate::Name(name)) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            quote! { ::#ident }
        }
        _ => quote! { ::power },
    }
}
